pub(crate) mod audit;
pub(crate) mod limits;
pub(crate) mod meta;
pub(crate) mod shared;
