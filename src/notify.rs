// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # Operator Notifications
//!
//! Fulfillment runs unattended, so every terminal outcome is surfaced
//! through this seam in addition to the caller's `Result`. The default
//! implementation emits structured log events; deployments can plug in
//! anything louder.

/// Human-observable success/failure signal.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Notifier backed by the tracing pipeline.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        tracing::info!(target: "operator", title, body, "Operator notification");
    }
}

#[cfg(test)]
pub mod test_support {
    use std::sync::Mutex;

    use super::Notifier;

    /// Captures notifications for assertions.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub messages: Mutex<Vec<(String, String)>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, title: &str, body: &str) {
            self.messages
                .lock()
                .unwrap()
                .push((title.to_owned(), body.to_owned()));
        }
    }
}
