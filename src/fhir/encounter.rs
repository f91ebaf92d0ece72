use crate::config::ResourceConfig;
use crate::fhir::bundle::{business_identifier, reference};
use crate::fhir::mapper::{MappingError, meta, parse_datetime};
use crate::validate::VisitRecord;
use chrono_tz::Tz;
use fhir_model::BuilderError;
use fhir_model::r4b::codes::EncounterStatus;
use fhir_model::r4b::resources::Encounter;
use fhir_model::r4b::types::{Coding, Period};

const ACT_CODE: &str = "http://terminology.hl7.org/CodeSystem/v3-ActCode";
const NULL_FLAVOR: &str = "http://terminology.hl7.org/CodeSystem/v3-NullFlavor";

pub(super) fn map_encounter(
    visit: &VisitRecord,
    config: &ResourceConfig,
    patient_ref: &str,
    tz: Tz,
) -> Result<Encounter, MappingError> {
    let mut encounter = Encounter::builder()
        .identifier(vec![Some(business_identifier(
            &config.system,
            &visit.visit_number,
        )?)])
        .status(EncounterStatus::InProgress)
        .class(map_class(visit.patient_class.as_deref())?)
        .subject(reference(patient_ref)?)
        .build()?;

    encounter.meta = meta(config)?;
    encounter.period = parse_datetime(visit.admit_date_time.as_deref(), tz)
        .map(|start| Period::builder().start(start).build())
        .transpose()?;

    Ok(encounter)
}

/// PV1-2 patient class to the v3 ActCode encounter class. The class is mandatory
/// on R4B encounters, so anything unmapped becomes NullFlavor `UNK`.
fn map_class(patient_class: Option<&str>) -> Result<Coding, BuilderError> {
    let (system, code, display) = match patient_class
        .unwrap_or_default()
        .trim()
        .to_uppercase()
        .as_str()
    {
        "I" => (ACT_CODE, "IMP", "inpatient encounter"),
        "O" => (ACT_CODE, "AMB", "ambulatory"),
        "E" => (ACT_CODE, "EMER", "emergency"),
        "P" => (ACT_CODE, "PRENC", "pre-admission"),
        _ => (NULL_FLAVOR, "UNK", "unknown"),
    };

    Coding::builder()
        .system(system.to_string())
        .code(code.to_string())
        .display(display.to_string())
        .build()
}
