use std::collections::BTreeMap;

/// Handle returned by `EventHub::subscribe`, used for removal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Subscription(u64);

/// Typed pub/sub with per-kind subscriber lists.
///
/// Fan-out is synchronous and unbounded: `emit` invokes every subscriber of
/// the kind, in subscription order, before returning. A slow subscriber
/// blocks the emitting call. There is no queuing and no backpressure.
pub struct EventHub<K, P>
where
    K: Ord + Clone,
{
    next_subscription: u64,
    subscribers: BTreeMap<K, Vec<(Subscription, Box<dyn FnMut(&P)>)>>,
}

impl<K, P> Default for EventHub<K, P>
where
    K: Ord + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P> EventHub<K, P>
where
    K: Ord + Clone,
{
    pub fn new() -> Self {
        Self {
            next_subscription: 1,
            subscribers: BTreeMap::new(),
        }
    }

    pub fn subscribe(&mut self, kind: K, callback: impl FnMut(&P) + 'static) -> Subscription {
        let sub = Subscription(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers
            .entry(kind)
            .or_default()
            .push((sub, Box::new(callback)));
        sub
    }

    /// Returns `true` if the subscription was still registered.
    pub fn unsubscribe(&mut self, sub: Subscription) -> bool {
        for list in self.subscribers.values_mut() {
            if let Some(pos) = list.iter().position(|(s, _)| *s == sub) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn subscriber_count(&self, kind: &K) -> usize {
        self.subscribers.get(kind).map(|l| l.len()).unwrap_or(0)
    }

    /// Invoke every subscriber of `kind`, in subscription order.
    pub fn emit(&mut self, kind: &K, payload: &P) {
        if let Some(list) = self.subscribers.get_mut(kind) {
            for (_sub, callback) in list.iter_mut() {
                callback(payload);
            }
        }
    }
}
