// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Resource change notification.
//!
//! Objects mark resources dirty through a [`ChangeNotifier`]. The protocol
//! engine drains the [`NotificationQueue`] on its next step and informs
//! observing servers. Marking is fire-and-forget.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::value::ResourcePath;

/// Sink for resource value changes.
pub trait ChangeNotifier: Send + Sync {
    /// Record that `/object/instance/resource` changed.
    fn notify(&self, object: u16, instance: u16, resource: u16);
}

/// Pending changes, coalesced per path, in first-marked order.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    pending: Mutex<VecDeque<ResourcePath>>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every pending path.
    pub fn drain(&self) -> Vec<ResourcePath> {
        self.pending.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl ChangeNotifier for NotificationQueue {
    fn notify(&self, object: u16, instance: u16, resource: u16) {
        let path = ResourcePath::resource(object, instance, resource);
        let mut pending = self.pending.lock();
        if !pending.contains(&path) {
            log::trace!("[notify] {} marked dirty", path);
            pending.push_back(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_coalesces_and_drains() {
        let queue = NotificationQueue::new();
        queue.notify(3303, 0, 5700);
        queue.notify(3303, 0, 5601);
        queue.notify(3303, 0, 5700);
        assert_eq!(queue.len(), 2);

        let drained = queue.drain();
        assert_eq!(
            drained,
            vec![
                ResourcePath::resource(3303, 0, 5700),
                ResourcePath::resource(3303, 0, 5601),
            ]
        );
        assert!(queue.is_empty());
    }
}
