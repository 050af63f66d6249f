//! # Operation Dispatch Layer
//!
//! Routes every numeric call to exactly one registered provider.
//!
//! ## Submodules
//!
//! - [`resolve`]: the resolution algorithm (operands → provider)
//! - [`dispatch`]: the [`Dispatcher`](dispatch::Dispatcher): locking,
//!   precision handling, construction and execution
//! - [`cpu`]: the built-in CPU provider (default fallback backend)
//!
//! ## Backend Selection
//!
//! Callers never pick a provider. Operands decide: natives go to the
//! provider that owns them, plain numbers and lists go wherever the other
//! operands go (or to the default provider), and natives from two different
//! providers are refused.
//!
//! ## Extending the Backend
//!
//! To add a new engine:
//!
//! 1. Give it a native type implementing [`NativeArray`](crate::NativeArray)
//! 2. Implement [`Provider`](crate::Provider) for it
//! 3. Register it with [`Dispatcher::add_backend`](dispatch::Dispatcher::add_backend)

pub mod cpu;
pub mod dispatch;
pub mod resolve;
