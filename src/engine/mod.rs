//! Plan and apply: previews are computed into a [`planner::Plan`],
//! displayed by [`differ`], and carried out by [`executor`].

pub mod differ;
pub mod executor;
pub mod planner;
