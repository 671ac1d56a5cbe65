use crate::options::{NotificationOptions, build_notification_options};
use crate::payload::{PushData, parse_push_payload};
use crate::routing::resolve_target_url;

/// The side-effecting platform surface the worker drives. Everything the
/// worker decides is pure; everything it touches goes through here.
pub trait ClientShell {
    fn show_notification(&self, options: &NotificationOptions);
    fn close_notification(&self);
    /// Navigate an already-open application window to `url` and focus it.
    /// Returns false when no window is open.
    fn focus_existing(&self, url: &str) -> bool;
    fn open_window(&self, url: &str);
    fn skip_waiting(&self);
    fn claim_clients(&self);
}

/// The background worker: one handler per platform event, no state.
pub struct PushWorker<S: ClientShell> {
    shell: S,
}

impl<S: ClientShell> PushWorker<S> {
    pub fn new(shell: S) -> Self {
        Self { shell }
    }

    /// Updates take effect immediately: don't sit in the waiting phase.
    pub fn on_install(&self) {
        self.shell.skip_waiting();
    }

    /// Claim every open client so no tab keeps running an older worker.
    pub fn on_activate(&self) {
        self.shell.claim_clients();
    }

    /// Parse, build, show. Absent or garbled payloads are permanent no-ops.
    pub fn on_push(&self, raw: Option<&[u8]>) {
        let Some(payload) = parse_push_payload(raw) else {
            return;
        };
        let options = build_notification_options(payload);
        self.shell.show_notification(&options);
    }

    /// Close the notification, resolve the deep link, then reuse an open
    /// window if there is one, else open a fresh one.
    pub fn on_notification_click(&self, data: &PushData) {
        self.shell.close_notification();
        let url = resolve_target_url(data);
        if !self.shell.focus_existing(&url) {
            self.shell.open_window(&url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::APP_NAME;
    use std::cell::RefCell;

    #[derive(Debug, PartialEq)]
    enum ShellCall {
        Show(String, String),
        Close,
        Focus(String),
        Open(String),
        SkipWaiting,
        ClaimClients,
    }

    #[derive(Default)]
    struct FakeShell {
        calls: RefCell<Vec<ShellCall>>,
        has_window: bool,
    }

    impl ClientShell for FakeShell {
        fn show_notification(&self, options: &NotificationOptions) {
            self.calls
                .borrow_mut()
                .push(ShellCall::Show(options.title.clone(), options.body.clone()));
        }
        fn close_notification(&self) {
            self.calls.borrow_mut().push(ShellCall::Close);
        }
        fn focus_existing(&self, url: &str) -> bool {
            self.calls.borrow_mut().push(ShellCall::Focus(url.into()));
            self.has_window
        }
        fn open_window(&self, url: &str) {
            self.calls.borrow_mut().push(ShellCall::Open(url.into()));
        }
        fn skip_waiting(&self) {
            self.calls.borrow_mut().push(ShellCall::SkipWaiting);
        }
        fn claim_clients(&self) {
            self.calls.borrow_mut().push(ShellCall::ClaimClients);
        }
    }

    #[test]
    fn empty_data_object_renders_the_fallback_notification() {
        let worker = PushWorker::new(FakeShell::default());
        worker.on_push(Some(b"{}"));
        assert_eq!(
            *worker.shell.calls.borrow(),
            [ShellCall::Show(APP_NAME.into(), String::new())]
        );
    }

    #[test]
    fn absent_and_malformed_payloads_show_nothing() {
        let worker = PushWorker::new(FakeShell::default());
        worker.on_push(None);
        worker.on_push(Some(b"garbage"));
        assert!(worker.shell.calls.borrow().is_empty());
    }

    #[test]
    fn click_focuses_an_open_window() {
        let worker = PushWorker::new(FakeShell {
            has_window: true,
            ..Default::default()
        });
        worker.on_notification_click(&PushData {
            kind: Some("message".into()),
            conversation_id: Some("abc".into()),
            post_id: None,
        });
        assert_eq!(
            *worker.shell.calls.borrow(),
            [ShellCall::Close, ShellCall::Focus("/chat?id=abc".into())]
        );
    }

    #[test]
    fn click_opens_a_window_when_none_exists() {
        let worker = PushWorker::new(FakeShell::default());
        worker.on_notification_click(&PushData::default());
        assert_eq!(
            *worker.shell.calls.borrow(),
            [
                ShellCall::Close,
                ShellCall::Focus("/feed".into()),
                ShellCall::Open("/feed".into())
            ]
        );
    }

    #[test]
    fn lifecycle_skips_waiting_and_claims_clients() {
        let worker = PushWorker::new(FakeShell::default());
        worker.on_install();
        worker.on_activate();
        assert_eq!(
            *worker.shell.calls.borrow(),
            [ShellCall::SkipWaiting, ShellCall::ClaimClients]
        );
    }
}
