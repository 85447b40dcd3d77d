//! Data model, configuration, and settings types shared across the QuotaGuard workspace.
#![warn(missing_docs)]

mod account;
mod alert;
mod config;
mod ids;
mod quota;
mod reservation;
mod settings;

pub use account::{Account, AccountCredentials, Provider, ProviderType};
pub use alert::{AlertRecord, AlertType, DedupKey, MuteState, Severity};
pub use config::{
    ActiveCollectorConfig, AlertConfig, ChainKey, LimiterConfig, PassiveCollectorConfig,
    ReservationConfig, RouterConfig, StoreConfig, Weights,
};
pub use ids::{AccountId, CorrelationId, ReservationId};
pub use quota::{derive_effective_remaining_pct, Dimension, DimensionType, QuotaInfo, QuotaSource, WindowSemantics};
pub use reservation::{Reservation, ReservationStatus};
pub use settings::{setting_keys, SettingValue};
