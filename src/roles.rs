use std::collections::HashSet;

use crate::models::{Job, Poller, PostMode};

/// Derived partitioning of session names into poll and post roles. Never
/// stored; recomputed from the poller and job tables whenever a mutation
/// needs to be checked.
#[derive(Debug, Default)]
pub struct RoleMap {
    pub poll: HashSet<String>,
    pub post: HashSet<String>,
}

impl RoleMap {
    pub fn derive<'a>(
        pollers: impl IntoIterator<Item = &'a Poller>,
        jobs: impl IntoIterator<Item = &'a Job>,
    ) -> Self {
        let mut map = Self::default();
        for poller in pollers {
            map.poll.insert(poller.poll_session.to_lowercase());
        }
        for job in jobs {
            if job.post_mode == PostMode::User
                && let Some(name) = job.post_session.as_deref()
            {
                map.post.insert(name.to_lowercase());
            }
        }
        map
    }

    pub fn is_post(&self, name: &str) -> bool {
        self.post.contains(&name.to_lowercase())
    }

    pub fn is_poll(&self, name: &str) -> bool {
        self.poll.contains(&name.to_lowercase())
    }
}
