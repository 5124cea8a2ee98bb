//! The two anonymization algorithms, each implemented against the abstract
//! `Backend` contract (`spec.md` §4.3, §4.4).

pub mod datafly;
pub mod mondrian;
