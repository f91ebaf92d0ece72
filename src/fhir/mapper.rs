use crate::config::{AppConfig, Fhir, ResourceConfig};
use crate::fhir::bundle::{
    bundle_entry, encounter_full_url, observation_full_url, patient_full_url, transaction,
};
use crate::fhir::encounter::map_encounter;
use crate::fhir::observation::map_observations;
use crate::fhir::patient::map_patient;
use crate::hl7::normalize::normalize;
use crate::hl7::{ParseError, parse};
use crate::validate::adt_a01::AdtA01;
use crate::validate::oru_r01::OruR01;
use crate::validate::{
    DATE, MessageKind, NUMERIC, PatientRecord, TIMESTAMP, ValidationErrors, VisitRecord, adt_a01,
    oru_r01, require_supported_message_type,
};
use chrono::{NaiveDate, NaiveDateTime, SecondsFormat, TimeZone};
use chrono_tz::Tz;
use fhir_model::r4b::resources::{
    Bundle, Encounter, Observation, Patient, Resource, ResourceType,
};
use fhir_model::r4b::types::Meta;
use fhir_model::{BuilderError, Date, DateTime};
use log::debug;
use thiserror::Error;

const LOINC: &str = "http://loinc.org";

#[derive(Error, Debug)]
pub(crate) enum MappingError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("failed to build FHIR resource: {0}")]
    Builder(#[from] BuilderError),
    #[error("missing business identifier on {0} resource")]
    MissingIdentifier(ResourceType),
    #[error("unknown timezone '{0}'")]
    Timezone(String),
}

/// A message that passed the contract checks for its type.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Validated {
    Admission(AdtA01),
    Results(OruR01),
}

impl Validated {
    pub(crate) fn kind(&self) -> MessageKind {
        match self {
            Validated::Admission(_) => MessageKind::AdtA01,
            Validated::Results(_) => MessageKind::OruR01,
        }
    }

    pub(crate) fn message_type(&self) -> &str {
        match self {
            Validated::Admission(adt) => &adt.header.message_type,
            Validated::Results(oru) => &oru.header.message_type,
        }
    }

    pub(crate) fn control_id(&self) -> &str {
        match self {
            Validated::Admission(adt) => &adt.header.control_id,
            Validated::Results(oru) => &oru.header.control_id,
        }
    }

    pub(crate) fn patient(&self) -> &PatientRecord {
        match self {
            Validated::Admission(adt) => &adt.patient,
            Validated::Results(oru) => &oru.patient,
        }
    }

    pub(crate) fn visit(&self) -> &VisitRecord {
        match self {
            Validated::Admission(adt) => &adt.visit,
            Validated::Results(oru) => &oru.visit,
        }
    }
}

/// Reference strings the mapped resources point at. Not resolved here.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct References {
    pub(crate) patient: String,
    pub(crate) encounter: String,
}

impl References {
    /// Transaction-internal urns, as used for `fullUrl` in the bundle.
    pub(crate) fn bundle(control_id: &str) -> Self {
        References {
            patient: patient_full_url(control_id),
            encounter: encounter_full_url(control_id),
        }
    }
}

/// Everything one message maps to. Observations stay in OBX order.
#[derive(Debug, Clone)]
pub(crate) struct MappedResources {
    pub(crate) patient: Patient,
    pub(crate) encounter: Encounter,
    pub(crate) observations: Vec<Observation>,
}

impl MappedResources {
    pub(crate) fn len(&self) -> usize {
        2 + self.observations.len()
    }

    pub(crate) fn into_resources(self) -> Vec<Resource> {
        let mut resources = vec![
            Resource::from(self.patient),
            Resource::from(self.encounter),
        ];
        resources.extend(self.observations.into_iter().map(Resource::from));
        resources
    }
}

#[derive(Clone)]
pub(crate) struct FhirMapper {
    pub(crate) config: Fhir,
    timezone: Tz,
}

impl FhirMapper {
    pub(crate) fn new(config: AppConfig) -> Result<Self, MappingError> {
        let timezone = config
            .fhir
            .timezone
            .parse::<Tz>()
            .map_err(|_| MappingError::Timezone(config.fhir.timezone.clone()))?;

        Ok(FhirMapper {
            config: config.fhir,
            timezone,
        })
    }

    /// Tokenize, gate on the message type and run the matching validator.
    pub(crate) fn validate(&self, msg: &str) -> Result<Validated, MappingError> {
        let v2_msg = parse(msg)?;
        let kind = require_supported_message_type(&normalize(&v2_msg))?;
        debug!("Dispatching {kind} message to its validator");

        Ok(match kind {
            MessageKind::AdtA01 => Validated::Admission(adt_a01::validate(&v2_msg)?),
            MessageKind::OruR01 => Validated::Results(oru_r01::validate(&v2_msg)?),
        })
    }

    /// Patient, Encounter and (for results) Observations.
    pub(crate) fn map_resources(
        &self,
        validated: &Validated,
        refs: &References,
    ) -> Result<MappedResources, MappingError> {
        let patient = map_patient(validated.patient(), &self.config.patient)?;
        let encounter = map_encounter(
            validated.visit(),
            &self.config.encounter,
            &refs.patient,
            self.timezone,
        )?;
        let observations = match validated {
            Validated::Admission(_) => vec![],
            Validated::Results(oru) => {
                map_observations(oru, &self.config.observation, refs, self.timezone)?
            }
        };

        Ok(MappedResources {
            patient,
            encounter,
            observations,
        })
    }

    pub(crate) fn map_bundle(&self, validated: &Validated) -> Result<Bundle, MappingError> {
        let control_id = validated.control_id();
        let refs = References::bundle(control_id);
        let resources = self.map_resources(validated, &refs)?;

        let mut entries = vec![
            bundle_entry(refs.patient, resources.patient)?,
            bundle_entry(refs.encounter, resources.encounter)?,
        ];
        for (i, observation) in resources.observations.into_iter().enumerate() {
            entries.push(bundle_entry(
                observation_full_url(control_id, i + 1),
                observation,
            )?);
        }

        debug!(
            "Mapped {} message [control_id={control_id}] to {} bundle entries",
            validated.kind(),
            entries.len()
        );

        Ok(transaction(entries)?)
    }

    pub(crate) fn map(&self, msg: &str) -> Result<(Validated, Bundle), MappingError> {
        let validated = self.validate(msg)?;
        let bundle = self.map_bundle(&validated)?;
        Ok((validated, bundle))
    }
}

pub(crate) fn meta(config: &ResourceConfig) -> Result<Option<Meta>, BuilderError> {
    config
        .profile
        .as_ref()
        .map(|p| Meta::builder().profile(vec![Some(p.to_owned())]).build())
        .transpose()
}

/// `YYYYMMDD` to a FHIR date; anything else is omitted.
pub(crate) fn parse_date(raw: Option<&str>) -> Option<Date> {
    let s = raw?.trim();
    if !DATE.is_match(s) {
        return None;
    }
    let date = NaiveDate::parse_from_str(s, "%Y%m%d").ok()?;
    date.format("%Y-%m-%d").to_string().parse().ok()
}

/// `YYYYMMDDHHMMSS`, read as local time in `tz`, to a FHIR dateTime with offset.
pub(crate) fn parse_datetime(raw: Option<&str>, tz: Tz) -> Option<DateTime> {
    let s = raw?.trim();
    if !TIMESTAMP.is_match(s) {
        return None;
    }
    let local = NaiveDateTime::parse_from_str(s, "%Y%m%d%H%M%S").ok()?;
    // local times skipped by a DST change do not exist and are omitted
    let zoned = tz.from_local_datetime(&local).earliest()?;
    zoned
        .to_rfc3339_opts(SecondsFormat::Secs, true)
        .parse()
        .ok()
}

/// Result timestamps may also be date-only.
pub(crate) fn parse_result_time(raw: Option<&str>, tz: Tz) -> Option<DateTime> {
    parse_datetime(raw, tz).or_else(|| parse_date(raw).map(DateTime::Date))
}

/// Only known coding systems get a URI. Never invent one.
pub(crate) fn map_coding_system(system: Option<&str>) -> Option<String> {
    match system.unwrap_or_default().trim().to_uppercase().as_str() {
        "LN" => Some(LOINC.to_owned()),
        _ => None,
    }
}

pub(crate) fn parse_numeric(value: &str) -> Option<f64> {
    let s = value.trim();
    if !NUMERIC.is_match(s) {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}
