//! HubSpot destination: contact upsert over the CRM v3 API.

pub mod client;
pub mod config;
pub mod upsert_contact;

use destination_common::registry::{ActionDescriptor, DestinationDescriptor};

/// Descriptor for the explicit destination registry built at startup.
pub fn descriptor() -> DestinationDescriptor {
    DestinationDescriptor {
        slug: "hubspot",
        name: "HubSpot",
        actions: vec![ActionDescriptor {
            slug: "upsert_contact",
            title: "Upsert Contact",
            description: "Create or update a contact in HubSpot.",
            default_subscription: Some("type = \"identify\""),
        }],
    }
}
