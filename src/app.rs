use chrono::Utc;
use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

use crate::cart::{CartSnapshot, CartStore};
use crate::catalog::{format_brl, Catalog, Product};
use crate::config::Config;
use crate::db::{Database, SqliteKv};
use crate::event::{Event, EventHandler};
use crate::gateway::{
  notification_for_push, on_notification_click, CacheSource, CacheStorage, DrainReport,
  FetchOutcome, HttpFetcher, NoopStorage, OfflineGateway, PendingQueue, Request, RequestKind,
  SqliteStorage, SyncWorker,
};
use crate::notify::{ConsoleNotifier, LogHaptics, Notifier};
use crate::prompt;
use crate::splash::{self, SplashProgress};
use crate::storefront::Storefront;

/// Returning visitors skip the rest of the splash after this long
const REPEAT_LOAD_SPLASH: Duration = Duration::from_millis(1500);

#[derive(Subcommand, Debug)]
pub enum Command {
  /// List products, optionally filtered
  Catalog {
    /// Match against name or description
    #[arg(short, long)]
    search: Option<String>,
    /// Only this category (vegetal, mineral, embalado, acessorios)
    #[arg(short, long)]
    category: Option<String>,
  },
  /// Show or change the cart
  Cart {
    #[command(subcommand)]
    action: Option<CartAction>,
  },
  /// Confirm the order and empty the cart
  Checkout,
  /// Download the precache manifest into the current cache
  Install,
  /// Delete caches left by older versions
  Activate,
  /// Send a request through the offline gateway
  Fetch {
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// JSON request body
    #[arg(short, long)]
    data: Option<String>,
    /// Treat the request as a page navigation
    #[arg(long)]
    navigate: bool,
  },
  /// Replay queued requests
  Sync {
    /// Named sync: sync-orders, sync-location or update-data
    #[arg(long)]
    tag: Option<String>,
    /// Keep running, replaying on a timer until interrupted
    #[arg(long)]
    watch: bool,
  },
  /// List requests waiting for replay
  Queue,
  /// Render a push notification from a JSON payload
  Push {
    payload: Option<String>,
    /// Simulate clicking an action (view, close)
    #[arg(long)]
    click: Option<String>,
  },
  /// Run the loading splash
  Splash,
  /// Show or dismiss the install prompt
  Prompt {
    #[arg(long)]
    dismiss: bool,
  },
}

#[derive(Subcommand, Debug)]
pub enum CartAction {
  Show,
  Add {
    id: u32,
  },
  Remove {
    id: u32,
  },
  /// Change a line's quantity by DELTA (may be negative)
  Qty {
    id: u32,
    #[arg(allow_hyphen_values = true)]
    delta: i64,
  },
  Clear,
}

type AppGateway = OfflineGateway<Box<dyn CacheStorage>, HttpFetcher>;

/// Main application state
pub struct App {
  config: Config,
  db: Database,
  notifier: Arc<ConsoleNotifier>,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let db = Database::open(&Database::default_path(&config.data_dir()?))?;

    Ok(Self {
      config,
      db,
      notifier: Arc::new(ConsoleNotifier),
    })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Catalog { search, category } => {
        self.list_catalog(search.as_deref(), category.as_deref());
        Ok(())
      }
      Command::Cart { action } => self.cart(action.unwrap_or(CartAction::Show)),
      Command::Checkout => {
        if let Some(receipt) = self.storefront().checkout()? {
          print_snapshot(&receipt);
        }
        Ok(())
      }
      Command::Install => {
        let count = self.gateway()?.install().await?;
        println!("Cached {} assets", count);
        Ok(())
      }
      Command::Activate => {
        let gateway = self.gateway()?;
        let purged = gateway.activate()?;
        if purged.is_empty() {
          println!("{} active, nothing to purge", gateway.cache_name());
        } else {
          println!("{} active, removed {}", gateway.cache_name(), purged.join(", "));
        }
        Ok(())
      }
      Command::Fetch {
        url,
        method,
        data,
        navigate,
      } => self.fetch(url, &method, data, navigate).await,
      Command::Sync { tag, watch } => self.sync(tag, watch).await,
      Command::Queue => self.list_queue(),
      Command::Push { payload, click } => {
        let notification = notification_for_push(payload.as_deref().map(str::as_bytes));
        self.notifier.show(&notification);
        if let Some(action) = click {
          match on_notification_click(Some(&action)) {
            Some(page) => println!("Opening {}", page),
            None => println!("Notification closed"),
          }
        }
        Ok(())
      }
      Command::Splash => self.splash().await,
      Command::Prompt { dismiss } => {
        let kv = SqliteKv::new(self.db.clone());
        if dismiss {
          prompt::dismiss(&kv, Utc::now())?;
          println!("Install prompt dismissed");
        } else if prompt::may_offer(&kv, Utc::now())? {
          println!("Install prompt may be shown");
        } else {
          println!("Install prompt suppressed");
        }
        Ok(())
      }
    }
  }

  fn storefront(&self) -> Storefront<SqliteKv, ConsoleNotifier, LogHaptics> {
    let cart = CartStore::load(SqliteKv::new(self.db.clone()), Catalog::builtin());
    Storefront::new(cart, ConsoleNotifier, LogHaptics)
  }

  fn gateway(&self) -> Result<AppGateway> {
    let storage: Box<dyn CacheStorage> = if self.config.gateway.cache_enabled {
      Box::new(SqliteStorage::new(self.db.clone()))
    } else {
      Box::new(NoopStorage)
    };
    let origin = Url::parse(&self.config.origin)
      .map_err(|e| eyre!("Invalid origin {}: {}", self.config.origin, e))?;
    let fetcher = Arc::new(HttpFetcher::new(&self.config.origin)?);

    Ok(OfflineGateway::new(
      storage,
      fetcher,
      PendingQueue::new(self.db.clone()),
      self.config.gateway.clone(),
      origin,
    ))
  }

  fn list_catalog(&self, search: Option<&str>, category: Option<&str>) {
    let catalog = Catalog::builtin();
    let mut products: Vec<&Product> = match category {
      Some(category) => catalog.by_category(category),
      None => catalog.products().iter().collect(),
    };
    if let Some(term) = search {
      let matches = catalog.search(term);
      products.retain(|p| matches.iter().any(|m| m.id == p.id));
    }

    if products.is_empty() {
      println!("Nenhum produto encontrado");
    }
    for product in products {
      let badge = product
        .badge
        .as_deref()
        .map(|b| format!(" [{}]", b))
        .unwrap_or_default();
      println!(
        "{:>3}  {:<24} {:>10}  {}{}",
        product.id,
        product.name,
        format_brl(product.price),
        product.description,
        badge
      );
    }
  }

  fn cart(&self, action: CartAction) -> Result<()> {
    let mut shop = self.storefront();
    let snapshot = match action {
      CartAction::Show => shop.snapshot(),
      CartAction::Add { id } => shop.add_to_cart(id)?,
      CartAction::Remove { id } => shop.remove_from_cart(id)?,
      CartAction::Qty { id, delta } => shop.update_quantity(id, delta)?,
      CartAction::Clear => shop.clear()?,
    };
    print_snapshot(&snapshot);
    Ok(())
  }

  async fn fetch(
    &self,
    url: String,
    method: &str,
    data: Option<String>,
    navigate: bool,
  ) -> Result<()> {
    let method = Method::from_bytes(method.to_uppercase().as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", method, e))?;

    let mut request = match data {
      Some(body) => Request::post_json(url, body.into_bytes()),
      None if navigate => Request::navigate(url),
      None => Request::get(url),
    };
    request.method = method;

    match self.gateway()?.handle(&request).await? {
      FetchOutcome::Response(result) => {
        let source = match result.source {
          CacheSource::Network => "network",
          CacheSource::Cache => "cache",
          CacheSource::Offline => "cache (offline)",
          CacheSource::Fallback => "offline page",
        };
        let age = result
          .cached_at
          .map(|at| format!(", cached {}", at.format("%Y-%m-%d %H:%M:%S")))
          .unwrap_or_default();
        println!(
          "{} {} from {}{}",
          result.data.status,
          result.data.content_type.as_deref().unwrap_or("-"),
          source,
          age
        );
        println!("{}", String::from_utf8_lossy(&result.data.body));
      }
      FetchOutcome::Queued { id, kind } => {
        println!("Offline: {} request queued as #{}", kind, id);
      }
      FetchOutcome::NoResponse => println!("Offline: no cached response"),
    }
    Ok(())
  }

  async fn sync(&self, tag: Option<String>, watch: bool) -> Result<()> {
    let worker = SyncWorker::new(self.gateway()?, Arc::clone(&self.notifier))
      .with_notify_on_success(self.config.sync.notify_on_success);

    if watch {
      let interval = Duration::from_secs(self.config.sync.interval_secs.max(1));
      let mut events = EventHandler::new(interval);
      let tx = events.sender();

      // Drain once immediately, as after regaining connectivity
      let _ = tx.send(Event::Online);
      if let Some(tag) = tag {
        let _ = tx.send(Event::Sync(tag));
      }

      tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
          let _ = tx.send(Event::Shutdown);
        }
      });

      info!(interval_secs = interval.as_secs(), "Watching for sync triggers");
      return worker.run(&mut events).await;
    }

    let report = match tag {
      Some(tag) => worker.handle_tag(&tag).await?,
      None => Some(worker.sync(&RequestKind::ALL).await?),
    };
    match report {
      Some(report) => print_report(&report),
      None => println!("Done"),
    }
    Ok(())
  }

  fn list_queue(&self) -> Result<()> {
    let queue = PendingQueue::new(self.db.clone());
    let mut empty = true;

    for kind in RequestKind::ALL {
      let count = queue.len(kind)?;
      if count == 0 {
        continue;
      }
      empty = false;
      println!("{}: {} pending", kind, count);
      for entry in queue.pending(kind)? {
        println!(
          "#{:<4} {:<9} {}  {} bytes  key {}",
          entry.id,
          entry.kind,
          entry.created_at.format("%Y-%m-%d %H:%M:%S"),
          entry.payload.len(),
          entry.idempotency_key.get(..12).unwrap_or(&entry.idempotency_key)
        );
      }
    }

    if empty {
      println!("Queue is empty");
    }
    Ok(())
  }

  async fn splash(&self) -> Result<()> {
    let kv = SqliteKv::new(self.db.clone());
    let first_load = splash::is_first_load(&kv);
    let mut progress = SplashProgress::new();
    let mut ticker = tokio::time::interval(Duration::from_millis(splash::TICK_MS));
    let mut elapsed = Duration::ZERO;

    println!("{:>3}% {}", progress.progress(), progress.message());
    while !progress.is_complete() {
      ticker.tick().await;
      elapsed += Duration::from_millis(splash::TICK_MS);

      if let Some(message) = progress.tick() {
        println!("{:>3}% {}", progress.progress(), message);
      }
      if !first_load && elapsed >= REPEAT_LOAD_SPLASH {
        break;
      }
    }

    splash::mark_loaded(&kv)?;
    println!("Redirecionando para /index.html");
    Ok(())
  }
}

fn print_snapshot(snapshot: &CartSnapshot) {
  if snapshot.is_empty() {
    println!("Seu carrinho está vazio");
    return;
  }

  for line in &snapshot.lines {
    println!(
      "{:>3}  {:<24} {:>3} x {:>10} = {:>10}",
      line.product_id,
      line.name,
      line.quantity,
      format_brl(line.price),
      format_brl(line.subtotal())
    );
  }
  println!(
    "{} itens, total {}",
    snapshot.item_count,
    format_brl(snapshot.total)
  );
}

fn print_report(report: &DrainReport) {
  if report.skipped {
    println!("Another sync is running");
    return;
  }
  println!(
    "{} delivered, {} still queued",
    report.delivered.len(),
    report.failed
  );
}
