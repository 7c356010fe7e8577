//! Controllers and the control convergence loop.
//!
//! Controllers are independent agents that read solver results from the
//! network model and write model inputs (setpoints, tap positions, storage
//! state). The [`ControlLoop`] alternates solver calls and controller
//! corrections until every controller reports convergence.
//!
//! # Architecture
//!
//! - Controllers implement the [`Controller`] trait and are registered in a
//!   [`ControllerRegistry`] with a `level` (execution phase) and an `order`
//!   (tie-break inside a level)
//! - Levels converge one after another, in ascending order
//! - Convergence is always derived from the current model, never cached
//! - Controllers only get write access to the model through [`ModelAccess`],
//!   lent by the loop for the duration of one `control_step`

pub mod const_control;
pub mod control_loop;
pub mod controller;
pub mod error;
pub mod registry;
pub mod storage;
pub mod tap;

pub use const_control::ConstControl;
pub use control_loop::{
    ControlLoop, DivergencePolicy, LevelReport, LoopOptions, LoopReport, Visibility,
    finalize_controllers, initialize_controllers, run_control, time_step_controllers,
};
pub use controller::{Controller, ModelAccess, StepContext};
pub use error::{ControlError, ControlResult};
pub use registry::{ControllerRegistry, ControllerSummary, Registration};
pub use storage::StorageControl;
pub use tap::{ContinuousTapControl, DiscreteTapControl, TapSide};
