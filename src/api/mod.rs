//! Admin Panel API
//! Mission: Contacts, page settings, user administration, audit listing

pub mod audit;
pub mod contacts;
pub mod settings;
pub mod users;

use crate::auth::user_store::UserStore;
use audit::AuditLog;
use contacts::ContactStore;
use settings::SettingsStore;
use std::sync::Arc;

/// Shared state for the panel handlers.
#[derive(Clone)]
pub struct PanelState {
    pub contacts: Arc<ContactStore>,
    pub settings: Arc<SettingsStore>,
    pub users: Arc<UserStore>,
    pub audit: Arc<AuditLog>,
}
