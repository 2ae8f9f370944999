use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, warn};
use once_cell::sync::OnceCell;

use crate::ag::operand::{accumulate_grad, Operand};
use crate::mat::{Float, Matrix};
use crate::nn::payload::Payload;

/// Role of a param inside its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParamKind {
    Weights,
    Biases,
    #[default]
    Undefined,
}

impl ParamKind {
    /// Parses the tag used when declaring a param: `"weights"`, `"biases"`
    /// (case insensitive). Anything else is `Undefined`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "weights" => ParamKind::Weights,
            "biases" => ParamKind::Biases,
            _ => ParamKind::Undefined,
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ParamKind::Weights => "weights",
            ParamKind::Biases => "biases",
            ParamKind::Undefined => "undefined",
        };
        f.write_str(tag)
    }
}

fn read<'a, X>(lock: &'a RwLock<X>, what: &str) -> RwLockReadGuard<'a, X> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!("Param {} lock was poisoned. Recovering.", what);
        poisoned.into_inner()
    })
}

fn write<'a, X>(lock: &'a RwLock<X>, what: &str) -> RwLockWriteGuard<'a, X> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!("Param {} lock was poisoned. Recovering.", what);
        poisoned.into_inner()
    })
}

/// A trainable matrix shared by every graph that reads it.
///
/// Value, gradient and optimizer payload sit behind three independent locks,
/// and no method holds two of them at once. Graphs running on different
/// threads can therefore accumulate gradients into the same param while an
/// optimizer reads another one.
///
/// The closure given to [`update_payload`](Param::update_payload) may read the
/// value or the gradient. Locks are then always taken payload first.
pub struct Param<T: Float> {
    name: OnceCell<String>,
    kind: OnceCell<ParamKind>,
    value: RwLock<Arc<Matrix<T>>>,
    grad: RwLock<Option<Matrix<T>>>,
    payload: RwLock<Option<Payload<T>>>,
    requires_grad: AtomicBool,
}

impl<T: Float> Param<T> {
    /// A param requiring gradients, with no name and an undefined kind.
    pub fn new(value: Matrix<T>) -> Self {
        Param {
            name: OnceCell::new(),
            kind: OnceCell::new(),
            value: RwLock::new(Arc::new(value)),
            grad: RwLock::new(None),
            payload: RwLock::new(None),
            requires_grad: AtomicBool::new(true),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = OnceCell::from(name.into());
        self
    }

    pub fn with_kind(mut self, kind: ParamKind) -> Self {
        self.kind = OnceCell::from(kind);
        self
    }

    pub fn with_requires_grad(self, requires_grad: bool) -> Self {
        self.requires_grad.store(requires_grad, Ordering::Relaxed);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.get().map(String::as_str)
    }

    /// Sets the name unless one was already given. Returns whether it was set.
    pub(crate) fn init_name(&self, name: impl Into<String>) -> bool {
        self.name.set(name.into()).is_ok()
    }

    pub fn kind(&self) -> ParamKind {
        self.kind.get().copied().unwrap_or_default()
    }

    pub(crate) fn init_kind(&self, kind: ParamKind) -> bool {
        self.kind.set(kind).is_ok()
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad.load(Ordering::Relaxed)
    }

    pub fn set_requires_grad(&self, requires_grad: bool) {
        self.requires_grad.store(requires_grad, Ordering::Relaxed);
    }

    // --- Value ---

    /// Snapshot of the current value. Later updates do not affect it.
    pub fn value(&self) -> Arc<Matrix<T>> {
        Arc::clone(&read(&self.value, "value"))
    }

    pub fn scalar_value(&self) -> T {
        read(&self.value, "value").scalar_value()
    }

    /// Subtracts `delta` from the value in place.
    ///
    /// Snapshots handed out earlier keep the old value: the matrix is copied
    /// first if any of them is still alive.
    pub fn apply_delta(&self, delta: &Matrix<T>) {
        let mut value = write(&self.value, "value");
        Arc::make_mut(&mut value).sub_in_place(delta);
    }

    /// Clears payload and gradient, then swaps in `value`.
    pub fn replace_value(&self, value: Matrix<T>) {
        self.clear_payload();
        self.zero_grad();
        debug!(
            "Replacing value of param {} with a {}x{} matrix",
            self.name().unwrap_or("<unnamed>"),
            value.rows(),
            value.cols()
        );
        *write(&self.value, "value") = Arc::new(value);
    }

    // --- Gradient ---

    pub fn grad(&self) -> Option<Matrix<T>> {
        read(&self.grad, "grad").clone()
    }

    pub fn has_grad(&self) -> bool {
        read(&self.grad, "grad").is_some()
    }

    /// Adds `delta` to the gradient, allocating it with the shape of the value
    /// on first use. Does nothing when the param does not require gradients.
    pub fn acc_grad(&self, delta: &Matrix<T>) {
        if !self.requires_grad() {
            return;
        }
        let shape = self.value().shape();
        accumulate_grad(&mut write(&self.grad, "grad"), shape, delta, "Param::acc_grad");
    }

    /// Releases the gradient to the pool.
    pub fn zero_grad(&self) {
        if let Some(grad) = write(&self.grad, "grad").take() {
            grad.release();
        }
    }

    // --- Payload ---

    pub fn payload(&self) -> Option<Payload<T>> {
        read(&self.payload, "payload").clone()
    }

    pub fn set_payload(&self, payload: Payload<T>) {
        if let Some(mut old) = write(&self.payload, "payload").replace(payload) {
            old.clear_data();
        }
    }

    /// Drops the payload, releasing its matrices to the pool.
    pub fn clear_payload(&self) {
        if let Some(mut old) = write(&self.payload, "payload").take() {
            old.clear_data();
        }
    }

    /// Runs `f` on the payload slot while holding its lock.
    pub fn update_payload<R>(&self, f: impl FnOnce(&mut Option<Payload<T>>) -> R) -> R {
        f(&mut write(&self.payload, "payload"))
    }
}

impl<T: Float> fmt::Debug for Param<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Param")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("shape", &self.value().shape())
            .field("requires_grad", &self.requires_grad())
            .field("has_grad", &self.has_grad())
            .finish()
    }
}

impl<T: Float> Operand<T> for Param<T> {
    fn value(&self) -> Arc<Matrix<T>> {
        Param::value(self)
    }

    fn requires_grad(&self) -> bool {
        Param::requires_grad(self)
    }

    fn grad(&self) -> Option<Matrix<T>> {
        Param::grad(self)
    }

    fn has_grad(&self) -> bool {
        Param::has_grad(self)
    }

    fn acc_grad(&self, gx: &Matrix<T>) {
        Param::acc_grad(self, gx)
    }
}

#[cfg(test)]
#[path = "param_test.rs"]
mod tests;
