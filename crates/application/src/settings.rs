use std::sync::{Arc, RwLock};

use domain::arbiter::entity::SyncSettings;

/// Shared handle to the arbiter-reloadable settings subset.
///
/// The evaluator reads `alert_threshold` on every evaluation; the sync
/// service replaces the whole snapshot when `/sync` or a config-update
/// push changes it.
#[derive(Clone)]
pub struct SharedSettings {
    inner: Arc<RwLock<SyncSettings>>,
}

impl SharedSettings {
    pub fn new(initial: SyncSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn get(&self) -> SyncSettings {
        *self.inner.read().expect("settings lock poisoned")
    }

    pub fn alert_threshold(&self) -> i32 {
        self.get().alert_threshold
    }

    pub fn replace(&self, settings: SyncSettings) {
        *self.inner.write().expect("settings lock poisoned") = settings;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_is_visible_to_readers() {
        let settings = SharedSettings::new(SyncSettings {
            alert_threshold: 50,
            sniff_traffic: true,
            run_syslog: false,
        });
        assert_eq!(settings.alert_threshold(), 50);

        let clone = settings.clone();
        clone.replace(SyncSettings {
            alert_threshold: 70,
            sniff_traffic: false,
            run_syslog: true,
        });

        assert_eq!(settings.alert_threshold(), 70);
        assert!(settings.get().run_syslog);
    }
}
