use crate::config::ResourceConfig;
use crate::fhir::bundle::business_identifier;
use crate::fhir::mapper::{MappingError, meta, parse_date};
use crate::validate::PatientRecord;
use fhir_model::BuilderError;
use fhir_model::r4b::codes::AdministrativeGender;
use fhir_model::r4b::resources::Patient;
use fhir_model::r4b::types::HumanName;

pub(super) fn map_patient(
    record: &PatientRecord,
    config: &ResourceConfig,
) -> Result<Patient, MappingError> {
    let mut patient = Patient::builder()
        .identifier(vec![Some(business_identifier(&config.system, &record.mrn)?)])
        .name(map_name(record)?)
        .gender(map_gender(record.sex.as_deref()))
        .build()?;

    patient.meta = meta(config)?;
    // malformed calendar dates are dropped rather than sent
    patient.birth_date = parse_date(record.birth_date.as_deref());

    Ok(patient)
}

fn map_gender(sex: Option<&str>) -> AdministrativeGender {
    match sex.unwrap_or_default().trim().to_uppercase().as_str() {
        "F" => AdministrativeGender::Female,
        "M" => AdministrativeGender::Male,
        "O" => AdministrativeGender::Other,
        _ => AdministrativeGender::Unknown,
    }
}

fn map_name(record: &PatientRecord) -> Result<Vec<Option<HumanName>>, BuilderError> {
    if record.family_name.is_none() && record.given_name.is_none() {
        return Ok(vec![]);
    }

    let mut name = HumanName::builder()
        .given(record.given_name.iter().cloned().map(Some).collect())
        .build()?;
    name.family = record.family_name.clone();

    Ok(vec![Some(name)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use rstest::rstest;
    use serde_json::{Value, json};

    fn record() -> PatientRecord {
        PatientRecord {
            mrn: "MRN1".into(),
            family_name: Some("Doe".into()),
            given_name: Some("Jane".into()),
            birth_date: Some("19900101".into()),
            sex: Some("F".into()),
        }
    }

    fn mapped(record: &PatientRecord, config: &ResourceConfig) -> Value {
        serde_json::to_value(map_patient(record, config).unwrap()).unwrap()
    }

    #[rstest]
    #[case(Some("M"), AdministrativeGender::Male)]
    #[case(Some("f"), AdministrativeGender::Female)]
    #[case(Some(" O "), AdministrativeGender::Other)]
    #[case(Some("U"), AdministrativeGender::Unknown)]
    #[case(Some("X"), AdministrativeGender::Unknown)]
    #[case(None, AdministrativeGender::Unknown)]
    fn genders(#[case] sex: Option<&str>, #[case] expected: AdministrativeGender) {
        assert_eq!(map_gender(sex), expected);
    }

    #[test]
    fn full_demographics() {
        let patient = mapped(&record(), &AppConfig::default().fhir.patient);

        assert_eq!(patient["resourceType"], "Patient");
        assert_eq!(
            patient["identifier"],
            json!([{
                "use": "usual",
                "system": "http://hospital.example.org/identifiers/mrn",
                "value": "MRN1"
            }])
        );
        assert_eq!(patient["name"], json!([{"family": "Doe", "given": ["Jane"]}]));
        assert_eq!(patient["gender"], "female");
        assert_eq!(patient["birthDate"], "1990-01-01");
        assert!(patient.get("meta").is_none());
    }

    #[test]
    fn given_name_only() {
        let patient = mapped(
            &PatientRecord {
                family_name: None,
                sex: None,
                ..record()
            },
            &AppConfig::default().fhir.patient,
        );

        assert_eq!(patient["name"], json!([{"given": ["Jane"]}]));
        assert_eq!(patient["gender"], "unknown");
    }

    #[test]
    fn impossible_birth_date_is_omitted() {
        let patient = mapped(
            &PatientRecord {
                birth_date: Some("19901341".into()),
                ..record()
            },
            &AppConfig::default().fhir.patient,
        );

        assert!(patient.get("birthDate").is_none());
    }

    #[test]
    fn configured_profile_is_declared() {
        let mut config = AppConfig::default().fhir.patient;
        config.profile = Some("https://example.org/StructureDefinition/Patient".into());

        let patient = mapped(&record(), &config);
        assert_eq!(
            patient["meta"]["profile"],
            json!(["https://example.org/StructureDefinition/Patient"])
        );
    }
}
