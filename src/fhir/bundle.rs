use crate::fhir::mapper::MappingError;
use fhir_model::BuilderError;
use fhir_model::r4b::codes::{BundleType, HTTPVerb, IdentifierUse};
use fhir_model::r4b::resources::{
    Bundle, BundleEntry, BundleEntryRequest, IdentifiableResource, Resource, ResourceType,
};
use fhir_model::r4b::types::{Identifier, Reference};
use urlencoding::encode;

pub(crate) fn patient_full_url(control_id: &str) -> String {
    format!("urn:uuid:patient-{control_id}")
}

pub(crate) fn encounter_full_url(control_id: &str) -> String {
    format!("urn:uuid:encounter-{control_id}")
}

/// Observations are numbered from 1 in message order.
pub(crate) fn observation_full_url(control_id: &str, seq: usize) -> String {
    format!("urn:uuid:observation-{control_id}-{seq}")
}

/// The identifier a resource is upserted on.
pub(crate) fn business_identifier(system: &str, value: &str) -> Result<Identifier, BuilderError> {
    Identifier::builder()
        .r#use(IdentifierUse::Usual)
        .system(system.to_owned())
        .value(value.to_owned())
        .build()
}

pub(crate) fn reference(target: &str) -> Result<Reference, BuilderError> {
    Reference::builder().reference(target.to_owned()).build()
}

/// Conditional update keyed on the resource's `usual` identifier.
pub(crate) fn bundle_entry<T: IdentifiableResource>(
    full_url: String,
    resource: T,
) -> Result<BundleEntry, MappingError>
where
    Resource: From<T>,
{
    let identifier = resource
        .identifier()
        .iter()
        .flatten()
        .find(|id| id.r#use == Some(IdentifierUse::Usual))
        .map(|id| (id.system.clone(), id.value.clone()));

    let resource = Resource::from(resource);
    let resource_type = resource.resource_type();
    let Some((Some(system), Some(value))) = identifier else {
        return Err(MappingError::MissingIdentifier(resource_type));
    };

    let request = BundleEntryRequest::builder()
        .method(HTTPVerb::Put)
        .url(conditional_reference(resource_type, &system, &value))
        .build()?;

    Ok(BundleEntry::builder()
        .full_url(full_url)
        .resource(resource)
        .request(request)
        .build()?)
}

pub(crate) fn conditional_reference(resource_type: ResourceType, system: &str, value: &str) -> String {
    format!(
        "{resource_type}?identifier={}|{}",
        encode(system),
        encode(value)
    )
}

pub(crate) fn transaction(entries: Vec<BundleEntry>) -> Result<Bundle, BuilderError> {
    Bundle::builder()
        .r#type(BundleType::Transaction)
        .entry(entries.into_iter().map(Some).collect())
        .build()
}
