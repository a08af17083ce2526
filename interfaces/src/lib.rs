pub mod baseline;
pub mod defs;

pub use baseline::BaselineDigestModel;
pub use defs::{DigestModel, DigestOutput, DigestPreferences, DigestSelectedItem, InputItem, InputItemReference};
