//! Change notifications emitted after successful batch writes.

use crate::models::{Item, User};
use log::{debug, info};

/// Receives the documents written by a sync cycle.
///
/// Called synchronously, once per cycle and category, only when the batch
/// was confirmed and is non-empty.
pub trait ChangeNotifier: Send + Sync {
    fn users_changed(&self, users: &[User]);

    fn items_changed(&self, items: &[Item]);
}

/// Default notifier that writes changes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl ChangeNotifier for LogNotifier {
    fn users_changed(&self, users: &[User]) {
        for user in users {
            debug!("[sync] User changed: {} ({})", user.username, user.id);
        }
        info!("[sync] {} user(s) changed", users.len());
    }

    fn items_changed(&self, items: &[Item]) {
        for item in items {
            debug!("[sync] Item changed: {} {}", item.slug, item.title);
        }
        info!("[sync] {} item(s) changed", items.len());
    }
}
