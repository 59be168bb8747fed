//! Explicit destination registry.
//!
//! Destinations are registered by constructing the registry once at startup
//! from a literal list of descriptors and passing it by reference to the
//! dispatch layer. There is no self-registration and no global state.

use std::collections::HashMap;

use crate::error::DestinationError;

/// One named operation a destination supports.
#[derive(Debug, Clone)]
pub struct ActionDescriptor {
    pub slug: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    /// Event filter the framework applies when the user has not configured
    /// one, e.g. `type = "identify"`.
    pub default_subscription: Option<&'static str>,
}

#[derive(Debug, Clone)]
pub struct DestinationDescriptor {
    pub slug: &'static str,
    pub name: &'static str,
    pub actions: Vec<ActionDescriptor>,
}

#[derive(Debug)]
pub struct DestinationRegistry {
    destinations: Vec<DestinationDescriptor>,
    by_slug: HashMap<&'static str, usize>,
}

impl DestinationRegistry {
    pub fn new(destinations: Vec<DestinationDescriptor>) -> Result<Self, DestinationError> {
        let mut by_slug = HashMap::with_capacity(destinations.len());
        for (position, destination) in destinations.iter().enumerate() {
            if by_slug.insert(destination.slug, position).is_some() {
                return Err(DestinationError::Validation(format!(
                    "duplicate destination slug '{}'",
                    destination.slug
                )));
            }
        }
        Ok(Self {
            destinations,
            by_slug,
        })
    }

    pub fn get(&self, slug: &str) -> Option<&DestinationDescriptor> {
        self.by_slug
            .get(slug)
            .map(|&position| &self.destinations[position])
    }

    pub fn iter(&self) -> impl Iterator<Item = &DestinationDescriptor> {
        self.destinations.iter()
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(slug: &'static str) -> DestinationDescriptor {
        DestinationDescriptor {
            slug,
            name: "Test Destination",
            actions: vec![ActionDescriptor {
                slug: "upsert_contact",
                title: "Upsert Contact",
                description: "Create or update a contact.",
                default_subscription: Some("type = \"identify\""),
            }],
        }
    }

    #[test]
    fn lookup_by_slug() {
        let registry =
            DestinationRegistry::new(vec![descriptor("hubspot"), descriptor("klaviyo")]).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("hubspot").unwrap().slug, "hubspot");
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn duplicate_slugs_are_rejected() {
        let err = DestinationRegistry::new(vec![descriptor("hubspot"), descriptor("hubspot")])
            .unwrap_err();
        assert!(matches!(err, DestinationError::Validation(_)));
    }
}
