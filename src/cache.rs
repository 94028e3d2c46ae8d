mod document;
mod store;

pub use self::{
    document::{MONTHS_PER_YEAR, YearCache},
    store::Store,
};
