pub mod archive;
pub mod collect;
pub mod reduce;
pub mod run;
pub mod status;
