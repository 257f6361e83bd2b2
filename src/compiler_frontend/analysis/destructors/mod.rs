//! ASAP destructor insertion support: liveness, drop records, destructor
//! plans, lowering of drops into explicit statements and its validation.

mod drop_plan;
mod liveness;
mod lowering;
mod validation;

pub use drop_plan::{
    DestructorPlan, DropFlag, DropInsertion, DropPlacement, DropReason, build_destructor_plans,
};

pub(crate) use drop_plan::in_destruction_order;
pub(crate) use liveness::{Liveness, extend_with_origins};
pub(crate) use lowering::{StatementIds, lower_drops};
pub(crate) use validation::validate_lowering;
