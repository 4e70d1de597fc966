pub mod correction;
pub mod error;
pub mod intent;
pub mod models;
pub mod money;
pub mod registry;
pub mod reply;

pub use correction::CorrectionHeuristic;
pub use error::{Adapter, RoutingError};
pub use intent::{normalize_text, IntentLabel};
pub use models::*;
pub use money::{format_money, parse_amount, CURRENCY_SYMBOLS, CURRENCY_WORDS};
pub use registry::{ActionRegistry, RegistryError, RoutingTables};
pub use reply::compose_envelope;
