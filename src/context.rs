//! Scoped shared state with an explicit mount lifecycle.
//!
//! A provider owns a value only while it is mounted. Mounting returns a
//! [`ProviderGuard`]; dropping the guard discards the value. Any read or write
//! while nothing is mounted fails with [`ConfigurationError::ProviderMissing`]
//! instead of silently falling back to a default.
//!
//! ```
//! use recall::context::{ConfigurationError, SearchContext};
//!
//! let search = SearchContext::new();
//! assert!(matches!(search.global_query(), Err(ConfigurationError::ProviderMissing(_))));
//!
//! let guard = search.mount().expect("first mount");
//! search.set_global_query("rust").expect("mounted");
//! assert_eq!(search.global_query().expect("mounted"), "rust");
//!
//! drop(guard);
//! assert!(search.global_query().is_err());
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

/// Programmer misuse of a provider. Returned at the call that misused it.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("{0} is missing")]
    ProviderMissing(&'static str),

    #[error("{0} is already mounted")]
    AlreadyMounted(&'static str),
}

/// A value that exists only while its provider is mounted.
///
/// Clones share the same slot.
#[derive(Debug)]
pub struct ContextSlot<T> {
    name: &'static str,
    tx: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for ContextSlot<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ContextSlot<T> {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            name,
            tx: Arc::new(tx),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Installs `initial` and returns the guard that keeps it alive.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::AlreadyMounted`] if a guard is still alive.
    pub fn mount(&self, initial: T) -> Result<ProviderGuard<T>, ConfigurationError> {
        let mut initial = Some(initial);
        let installed = self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = initial.take();
            true
        });
        if !installed {
            return Err(ConfigurationError::AlreadyMounted(self.name));
        }
        debug!(provider = self.name, "provider mounted");
        Ok(ProviderGuard { slot: self.clone() })
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Returns a copy of the current value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::ProviderMissing`] when not mounted.
    pub fn get(&self) -> Result<T, ConfigurationError> {
        self.tx
            .borrow()
            .clone()
            .ok_or(ConfigurationError::ProviderMissing(self.name))
    }

    /// Modifies the value in place and notifies watchers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::ProviderMissing`] when not mounted.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> Result<(), ConfigurationError> {
        let mut mounted = false;
        self.tx.send_if_modified(|slot| match slot {
            Some(value) => {
                mounted = true;
                f(value);
                true
            }
            None => false,
        });
        if mounted {
            Ok(())
        } else {
            Err(ConfigurationError::ProviderMissing(self.name))
        }
    }

    /// Receiver that observes every change, including the unmount (`None`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::ProviderMissing`] when not mounted.
    pub fn watch(&self) -> Result<watch::Receiver<Option<T>>, ConfigurationError> {
        if self.is_mounted() {
            Ok(self.tx.subscribe())
        } else {
            Err(ConfigurationError::ProviderMissing(self.name))
        }
    }
}

/// Keeps a provider mounted. Dropping it discards the provider's state.
#[derive(Debug)]
#[must_use = "the provider is unmounted when the guard is dropped"]
pub struct ProviderGuard<T> {
    slot: ContextSlot<T>,
}

impl<T> Drop for ProviderGuard<T> {
    fn drop(&mut self) {
        self.slot.tx.send_replace(None);
        debug!(provider = self.slot.name, "provider unmounted");
    }
}

/// Global search text shared across pages.
#[derive(Debug, Clone)]
pub struct SearchContext {
    slot: ContextSlot<String>,
}

impl SearchContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: ContextSlot::new("SearchProvider"),
        }
    }

    /// Mounts with an empty query.
    ///
    /// # Errors
    ///
    /// See [`ContextSlot::mount`].
    pub fn mount(&self) -> Result<ProviderGuard<String>, ConfigurationError> {
        self.slot.mount(String::new())
    }

    /// # Errors
    ///
    /// Returns [`ConfigurationError::ProviderMissing`] when not mounted.
    pub fn global_query(&self) -> Result<String, ConfigurationError> {
        self.slot.get()
    }

    /// # Errors
    ///
    /// Returns [`ConfigurationError::ProviderMissing`] when not mounted.
    pub fn set_global_query(&self, query: impl Into<String>) -> Result<(), ConfigurationError> {
        let query = query.into();
        self.slot.update(|current| *current = query)
    }

    /// # Errors
    ///
    /// Returns [`ConfigurationError::ProviderMissing`] when not mounted.
    pub fn watch(&self) -> Result<watch::Receiver<Option<String>>, ConfigurationError> {
        self.slot.watch()
    }
}

impl Default for SearchContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    /// Follow the platform preference.
    #[default]
    System,
}

impl Theme {
    /// Resolves the theme against the platform's dark-mode preference.
    #[must_use]
    pub const fn is_dark(self, prefers_dark: bool) -> bool {
        match self {
            Self::Light => false,
            Self::Dark => true,
            Self::System => prefers_dark,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub theme: Theme,
}

/// A partial settings change. `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
}

impl SettingsUpdate {
    fn apply(self, settings: &mut UserSettings) {
        if let Some(theme) = self.theme {
            settings.theme = theme;
        }
    }
}

/// User settings, including the theme.
#[derive(Debug, Clone)]
pub struct SettingsContext {
    slot: ContextSlot<UserSettings>,
}

impl SettingsContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: ContextSlot::new("SettingsProvider"),
        }
    }

    /// Mounts with default settings.
    ///
    /// # Errors
    ///
    /// See [`ContextSlot::mount`].
    pub fn mount(&self) -> Result<ProviderGuard<UserSettings>, ConfigurationError> {
        self.mount_with(UserSettings::default())
    }

    /// Mounts with previously saved settings.
    ///
    /// # Errors
    ///
    /// See [`ContextSlot::mount`].
    pub fn mount_with(
        &self,
        settings: UserSettings,
    ) -> Result<ProviderGuard<UserSettings>, ConfigurationError> {
        self.slot.mount(settings)
    }

    /// # Errors
    ///
    /// Returns [`ConfigurationError::ProviderMissing`] when not mounted.
    pub fn settings(&self) -> Result<UserSettings, ConfigurationError> {
        self.slot.get()
    }

    /// Merges `update` into the current settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::ProviderMissing`] when not mounted.
    pub fn update_settings(&self, update: SettingsUpdate) -> Result<(), ConfigurationError> {
        self.slot.update(|settings| update.apply(settings))
    }

    /// # Errors
    ///
    /// Returns [`ConfigurationError::ProviderMissing`] when not mounted.
    pub fn theme(&self) -> Result<Theme, ConfigurationError> {
        Ok(self.settings()?.theme)
    }

    /// # Errors
    ///
    /// Returns [`ConfigurationError::ProviderMissing`] when not mounted.
    pub fn set_theme(&self, theme: Theme) -> Result<(), ConfigurationError> {
        self.update_settings(SettingsUpdate { theme: Some(theme) })
    }

    /// # Errors
    ///
    /// Returns [`ConfigurationError::ProviderMissing`] when not mounted.
    pub fn watch(&self) -> Result<watch::Receiver<Option<UserSettings>>, ConfigurationError> {
        self.slot.watch()
    }
}

impl Default for SettingsContext {
    fn default() -> Self {
        Self::new()
    }
}
