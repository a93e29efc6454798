//! # Subscription router.
//!
//! The [`Router`] owns every subscription on a stage and the mailbox of every
//! actor. `publish` walks subscriptions in registration order and delivers each
//! event at most once per subscriber:
//!
//! ```text
//! publish(ev):
//!   visited = {}
//!   for sub in subscriptions (registration order):
//!     ├─ sub.subscriber ∈ visited          → skip
//!     ├─ !sub.pattern.matches(ev.to)       → skip
//!     ├─ guard verdict resolves to false   → skip
//!     └─ mailbox[sub.subscriber].send(ev); visited += sub.subscriber
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::address::{Address, Scope};
use crate::event::Event;
use crate::policies::MissingFieldPolicy;

use super::guard::{Guard, GuardContext, Verdict};

/// Interest of one subscriber in events matching `pattern`.
#[derive(Clone)]
pub(crate) struct Subscription {
    pub(crate) pattern: Address,
    pub(crate) subscriber: Arc<str>,
    /// Scope guards are evaluated in.
    pub(crate) scope: Scope,
    pub(crate) guard: Option<Guard>,
}

/// Subscriptions and mailboxes of one stage.
pub(crate) struct Router {
    subscriptions: Vec<Subscription>,
    mailboxes: HashMap<Arc<str>, mpsc::UnboundedSender<Event>>,
    missing_field: MissingFieldPolicy,
}

impl Router {
    pub(crate) fn new(missing_field: MissingFieldPolicy) -> Self {
        Self {
            subscriptions: Vec::new(),
            mailboxes: HashMap::new(),
            missing_field,
        }
    }

    /// Registers the queue feeding `subscriber`.
    pub(crate) fn attach(&mut self, subscriber: Arc<str>, mailbox: mpsc::UnboundedSender<Event>) {
        self.mailboxes.insert(subscriber, mailbox);
    }

    /// Appends a subscription. Duplicates are legal.
    pub(crate) fn subscribe(&mut self, sub: Subscription) {
        trace!(pattern = %sub.pattern, subscriber = %sub.subscriber, "subscribe");
        self.subscriptions.push(sub);
    }

    /// Drops the mailbox and every subscription of `subscriber`.
    pub(crate) fn detach(&mut self, subscriber: &str) {
        self.mailboxes.remove(subscriber);
        self.subscriptions.retain(|s| &*s.subscriber != subscriber);
    }

    /// Delivers `ev` to every matching subscriber once. Returns the number of
    /// subscribers reached.
    pub(crate) fn publish(&self, ev: &Event) -> usize {
        let mut visited: HashSet<&str> = HashSet::new();

        for sub in &self.subscriptions {
            if visited.contains(&*sub.subscriber) || !sub.pattern.matches(ev.to()) {
                continue;
            }
            let ctx = GuardContext::new(&sub.scope, None, ev);
            let passes = match Verdict::of(sub.guard.as_ref(), &ctx).resolve(self.missing_field) {
                Ok(passes) => passes,
                Err(missing) => {
                    warn!(
                        subscriber = %sub.subscriber,
                        error = %missing,
                        "guard failed at routing; treated as no match"
                    );
                    false
                }
            };
            if !passes {
                continue;
            }

            match self.mailboxes.get(&sub.subscriber) {
                Some(mailbox) => {
                    if mailbox.send(ev.clone()).is_err() {
                        trace!(subscriber = %sub.subscriber, "mailbox closed; event dropped");
                    }
                }
                None => {
                    warn!(
                        subscriber = %sub.subscriber,
                        event = %ev.to(),
                        "no mailbox for subscriber"
                    );
                }
            }
            visited.insert(&*sub.subscriber);
        }

        trace!(event = %ev.to(), delivered = visited.len(), "published");
        visited.len()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.subscriptions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Payload;
    use crate::routing::guard;

    fn sub(pattern: &str, subscriber: &str, g: Option<Guard>) -> Subscription {
        let scope = Scope::new("Lab", subscriber, "Main");
        Subscription {
            pattern: scope.resolve(pattern).unwrap(),
            subscriber: Arc::from(subscriber),
            scope,
            guard: g,
        }
    }

    fn ev(to: &str, payload: Payload) -> Event {
        Event::new(
            Address::new("Lab", "Src", "Main", ""),
            Address::parse(to).unwrap(),
            payload,
        )
    }

    fn router(
        policy: MissingFieldPolicy,
        names: &[&str],
    ) -> (Router, Vec<mpsc::UnboundedReceiver<Event>>) {
        let mut r = Router::new(policy);
        let mut rxs = Vec::new();
        for n in names {
            let (tx, rx) = mpsc::unbounded_channel();
            r.attach(Arc::from(*n), tx);
            rxs.push(rx);
        }
        (r, rxs)
    }

    #[test]
    fn each_subscriber_gets_an_event_once() {
        let (mut r, mut rxs) = router(MissingFieldPolicy::NoMatch, &["A", "B"]);
        r.subscribe(sub("*.*.*.*", "A", None));
        r.subscribe(sub("Ping", "A", None));
        r.subscribe(sub("*.*.*.*", "A", None));
        r.subscribe(sub("*.*.*", "B", None));

        assert_eq!(r.publish(&ev("Lab.A.Main.Ping", Payload::new())), 2);
        assert!(rxs[0].try_recv().is_ok());
        assert!(rxs[0].try_recv().is_err());
        assert!(rxs[1].try_recv().is_ok());
    }

    #[test]
    fn non_matching_patterns_are_skipped() {
        let (mut r, mut rxs) = router(MissingFieldPolicy::NoMatch, &["A"]);
        r.subscribe(sub("Ping", "A", None));
        assert_eq!(r.publish(&ev("Lab.A.Main.Pong", Payload::new())), 0);
        assert_eq!(r.publish(&ev("Lab.B.Main.Ping", Payload::new())), 0);
        assert!(rxs[0].try_recv().is_err());
    }

    #[test]
    fn failing_guard_lets_a_later_subscription_deliver() {
        let (mut r, mut rxs) = router(MissingFieldPolicy::NoMatch, &["A"]);
        let quit = guard(|ctx| Ok(ctx.field_str("line")? == "quit"));
        r.subscribe(sub("*.*.*.*", "A", Some(quit.clone())));
        assert_eq!(r.publish(&ev("Lab.A.Main.Line", Payload::new().with("line", "hi"))), 0);
        assert_eq!(r.publish(&ev("Lab.A.Main.Line", Payload::new())), 0);

        r.subscribe(sub("*.*.*.*", "A", None));
        assert_eq!(r.publish(&ev("Lab.A.Main.Line", Payload::new())), 1);
        assert_eq!(rxs[0].try_recv().unwrap().name(), "Line");
    }

    #[test]
    fn missing_field_policy_applies_to_router_guards() {
        let quit = guard(|ctx| Ok(ctx.field_str("line")? == "quit"));

        let (mut r, _rxs) = router(MissingFieldPolicy::Match, &["A"]);
        r.subscribe(sub("*.*.*.*", "A", Some(quit.clone())));
        assert_eq!(r.publish(&ev("Lab.A.Main.Line", Payload::new())), 1);

        let (mut r, _rxs) = router(MissingFieldPolicy::Fail, &["A"]);
        r.subscribe(sub("*.*.*.*", "A", Some(quit)));
        assert_eq!(r.publish(&ev("Lab.A.Main.Line", Payload::new())), 0);
    }

    #[test]
    fn detach_removes_subscriptions_and_mailbox() {
        let (mut r, _rxs) = router(MissingFieldPolicy::NoMatch, &["A", "B"]);
        r.subscribe(sub("*.*.*.*", "A", None));
        r.subscribe(sub("*.*.*.*", "B", None));
        r.detach("A");
        assert_eq!(r.len(), 1);
        assert_eq!(r.publish(&ev("Lab.A.Main.Ping", Payload::new())), 1);
    }
}
