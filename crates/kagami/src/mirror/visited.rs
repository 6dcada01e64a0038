use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use url::Url;

use super::task::TaskState;

/// Every url seen during a run, with the state of its task.
///
/// A url enters the set once, so it is fetched at most once however many manifests
/// refer to it.
#[derive(Debug, Default)]
pub struct VisitedSet {
    states: Mutex<HashMap<Url, TaskState>>,
}

fn key(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    url
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn states(&self) -> MutexGuard<'_, HashMap<Url, TaskState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `url` as queued. Returns `false` if it was already known.
    pub fn schedule(&self, url: &Url) -> bool {
        let mut states = self.states();
        let key = key(url);
        if states.contains_key(&key) {
            return false;
        }
        states.insert(key, TaskState::Queued);
        true
    }

    pub fn len(&self) -> usize {
        self.states().len()
    }

    pub fn transition(&self, url: &Url, state: TaskState) {
        if let Some(current) = self.states().get_mut(&key(url)) {
            if current.is_finished() {
                tracing::debug!("{url} is already {current:?}, ignoring {state:?}");
            } else {
                *current = state;
            }
        }
    }
}
