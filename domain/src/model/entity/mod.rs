pub mod job;
pub mod pbs;
pub mod token;

#[rustfmt::skip]
pub use self::{
    job::{JobArray, JobState, JobStatus},
    pbs::{ModuleOperation, PbsDirective, PbsScript},
    token::{Credentials, TokenRecord},
};
