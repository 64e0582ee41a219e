pub mod categories;
pub mod health;
pub mod parts;
pub mod requests;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::BorrowPolicy;
use crate::events::EventSender;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub requests: Arc<crate::services::requests::BorrowRequestService>,
    pub inventory: Arc<crate::services::inventory::InventoryService>,
    pub parts: Arc<crate::services::parts::PartService>,
    pub categories: Arc<crate::services::categories::CategoryService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        policy: BorrowPolicy,
    ) -> Self {
        let requests = Arc::new(crate::services::requests::BorrowRequestService::new(
            db.clone(),
            event_sender.clone(),
            policy,
        ));
        let inventory = Arc::new(crate::services::inventory::InventoryService::new(
            db.clone(),
            event_sender.clone(),
        ));
        let parts = Arc::new(crate::services::parts::PartService::new(
            db.clone(),
            event_sender,
        ));
        let categories = Arc::new(crate::services::categories::CategoryService::new(db));

        Self {
            requests,
            inventory,
            parts,
            categories,
        }
    }
}
