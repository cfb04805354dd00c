mod batch;
mod run;

pub use run::run;
