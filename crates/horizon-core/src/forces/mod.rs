/// Forces acting between simulated particles, on top of the central pull.
pub mod nbody;
