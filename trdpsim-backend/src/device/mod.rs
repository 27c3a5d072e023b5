//! Device profile management.
//!
//! Device profiles are XML documents describing the simulated device. They
//! are validated against an XML schema by a [`ProfileValidator`] before being
//! stored in the [`DeviceProfileRepository`].

pub mod repository;
pub mod validator;

use std::collections::HashSet;

pub use repository::DeviceProfileRepository;
pub use validator::{ProfileValidation, ProfileValidator, XmllintValidator};

/// Existence check used when resolving a scenario's device reference
pub trait ProfileLookup {
    fn profile_exists(&self, id: &str) -> bool;
}

impl ProfileLookup for DeviceProfileRepository {
    fn profile_exists(&self, id: &str) -> bool {
        self.exists(id)
    }
}

impl ProfileLookup for HashSet<String> {
    fn profile_exists(&self, id: &str) -> bool {
        self.contains(id)
    }
}

impl<T: ProfileLookup + ?Sized> ProfileLookup for &T {
    fn profile_exists(&self, id: &str) -> bool {
        (**self).profile_exists(id)
    }
}
