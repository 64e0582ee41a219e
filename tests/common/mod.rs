use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use borrowdesk_api::{
    config::BorrowPolicy,
    db::{self, DbConfig},
    entities::part,
    events::{Event, EventSender},
    handlers::AppServices,
    services::categories::NewCategory,
    services::parts::NewPart,
};

/// Test harness: in-memory SQLite with the full migration set applied and
/// the services wired the way `main` wires them.
///
/// The pool is capped at one connection; each pooled SQLite `:memory:`
/// connection would otherwise see its own empty database.
pub struct TestApp {
    pub db: Arc<sea_orm::DatabaseConnection>,
    pub services: AppServices,
    pub events: mpsc::Receiver<Event>,
}

impl TestApp {
    pub async fn new() -> Self {
        let config = DbConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            acquire_timeout: Duration::from_secs(5),
        };
        let pool = db::establish_connection_with_config(&config)
            .await
            .expect("connect to in-memory sqlite");
        db::run_migrations(&pool).await.expect("run migrations");

        let (event_tx, events) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let db = Arc::new(pool);
        let services = AppServices::new(db.clone(), event_sender, BorrowPolicy::default());

        Self {
            db,
            services,
            events,
        }
    }

    pub async fn seed_category(&self) -> Uuid {
        self.services
            .categories
            .create(NewCategory {
                name_en: "Microcontrollers".into(),
                name_ar: "المتحكمات".into(),
                description: String::new(),
            })
            .await
            .expect("create category")
            .id
    }

    /// Seeds a part with `total` units on the shelf.
    pub async fn seed_part(&self, part_number: &str, total: i32, minimum_stock: i32) -> part::Model {
        let category_id = self.seed_category().await;
        self.services
            .parts
            .create(NewPart {
                name_en: format!("Part {}", part_number),
                name_ar: format!("قطعة {}", part_number),
                description_en: String::new(),
                description_ar: String::new(),
                category_id,
                part_number: part_number.into(),
                manufacturer: None,
                model: None,
                total_quantity: total,
                minimum_stock: Some(minimum_stock),
                condition: borrowdesk_api::entities::part::PartCondition::Excellent,
                storage_location: None,
                purchase_price: None,
                notes: None,
                added_by: None,
            })
            .await
            .expect("create part")
    }

    pub async fn reload_part(&self, part_id: Uuid) -> part::Model {
        self.services.parts.get(part_id).await.expect("reload part")
    }
}
