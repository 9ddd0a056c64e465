use std::{
    any::Any,
    mem::take,
    rc::{Rc, Weak},
};


/// Handle returned by [`Scope::watch`](crate::Scope::watch).
///
/// Dropping the handle (or calling [`unsubscribe`](Self::unsubscribe)) removes the subscriber.
/// The watcher behind it is torn down when its last subscription goes away.
#[derive(Default)]
#[must_use]
pub struct Subscription(RawSubscription);

impl Subscription {
    pub fn empty() -> Self {
        Subscription(RawSubscription::Empty)
    }
    pub fn from_fn(f: impl FnOnce() + 'static) -> Self {
        Subscription(RawSubscription::Fn(Box::new(f)))
    }
    pub fn from_weak_fn<T: 'static>(
        this: Weak<T>,
        unsubscribe: impl FnOnce(Rc<T>) + 'static,
    ) -> Self {
        Subscription(RawSubscription::WeakFn {
            this,
            unsubscribe: Box::new(move |this| {
                if let Some(this) = this.upgrade() {
                    if let Ok(this) = this.downcast() {
                        unsubscribe(this)
                    }
                }
            }),
        })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.0, RawSubscription::Empty)
    }

    /// Unsubscribes now. Equivalent to dropping the handle.
    pub fn unsubscribe(mut self) {
        self.0.run();
    }
}
impl Drop for Subscription {
    fn drop(&mut self) {
        self.0.run();
    }
}
impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "Subscription(<empty>)")
        } else {
            write!(f, "Subscription(<active>)")
        }
    }
}

#[derive(Default)]
enum RawSubscription {
    #[default]
    Empty,
    Fn(Box<dyn FnOnce() + 'static>),
    WeakFn {
        this: Weak<dyn Any>,
        unsubscribe: Box<dyn FnOnce(Weak<dyn Any>)>,
    },
}
impl RawSubscription {
    fn run(&mut self) {
        match take(self) {
            RawSubscription::Empty => {}
            RawSubscription::Fn(f) => f(),
            RawSubscription::WeakFn { this, unsubscribe } => unsubscribe(this),
        }
    }
}
