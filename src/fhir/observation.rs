use crate::config::ResourceConfig;
use crate::fhir::bundle::{business_identifier, reference};
use crate::fhir::mapper::{
    MappingError, References, map_coding_system, meta, parse_numeric, parse_result_time,
};
use crate::validate::oru_r01::{ObservationRecord, OruR01};
use chrono_tz::Tz;
use fhir_model::BuilderError;
use fhir_model::r4b::codes::ObservationStatus;
use fhir_model::r4b::resources::{Observation, ObservationEffective, ObservationValue};
use fhir_model::r4b::types::{CodeableConcept, Coding, Quantity};

pub(super) fn map_observations(
    report: &OruR01,
    config: &ResourceConfig,
    refs: &References,
    tz: Tz,
) -> Result<Vec<Observation>, MappingError> {
    report
        .observations
        .iter()
        .map(|obs| map_observation(obs, &report.visit.visit_number, config, refs, tz))
        .collect()
}

fn map_observation(
    obs: &ObservationRecord,
    visit_number: &str,
    config: &ResourceConfig,
    refs: &References,
    tz: Tz,
) -> Result<Observation, MappingError> {
    let mut observation = Observation::builder()
        .identifier(vec![Some(business_identifier(
            &config.system,
            &observation_identifier(visit_number, obs),
        )?)])
        .status(ObservationStatus::Final)
        .code(map_code(obs)?)
        .subject(reference(&refs.patient)?)
        .encounter(reference(&refs.encounter)?)
        .build()?;

    observation.meta = meta(config)?;
    observation.effective =
        parse_result_time(obs.observed_at.as_deref(), tz).map(ObservationEffective::DateTime);
    observation.value = map_value(obs)?;

    Ok(observation)
}

fn map_code(obs: &ObservationRecord) -> Result<CodeableConcept, BuilderError> {
    let mut coding = Coding::builder().code(obs.code.clone()).build()?;
    coding.system = map_coding_system(obs.system.as_deref());
    coding.display = obs.display.clone();

    CodeableConcept::builder()
        .coding(vec![Some(coding)])
        .text(obs.display.clone().unwrap_or_else(|| obs.code.clone()))
        .build()
}

/// NM/SN become a quantity, everything else is sent as text. A quantity with
/// neither value nor unit is left out.
fn map_value(obs: &ObservationRecord) -> Result<Option<ObservationValue>, BuilderError> {
    if !obs.is_numeric() {
        return Ok(Some(ObservationValue::String(obs.value.clone())));
    }

    let value = parse_numeric(&obs.value);
    if value.is_none() && obs.units.is_none() {
        return Ok(None);
    }

    let mut quantity = Quantity::builder().build()?;
    quantity.value = value;
    quantity.unit = obs.units.clone();
    Ok(Some(ObservationValue::Quantity(quantity)))
}

/// `visit|set-id|code`, with `?` standing in for a missing part.
fn observation_identifier(visit_number: &str, obs: &ObservationRecord) -> String {
    [
        visit_number,
        obs.set_id.as_deref().unwrap_or("?"),
        if obs.code.is_empty() { "?" } else { obs.code.as_str() },
    ]
    .join("|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use rstest::rstest;
    use serde_json::{Value, json};

    fn glucose() -> ObservationRecord {
        ObservationRecord {
            set_id: Some("1".into()),
            value_type: "NM".into(),
            code: "2345-7".into(),
            display: Some("Glucose".into()),
            system: Some("LN".into()),
            value: "7.2".into(),
            units: Some("mg/dL".into()),
            observed_at: Some("20240101083000".into()),
        }
    }

    fn mapped(record: &ObservationRecord) -> Value {
        let obs = map_observation(
            record,
            "V1",
            &AppConfig::default().fhir.observation,
            &References::bundle("CTRL2"),
            Tz::UTC,
        )
        .unwrap();
        serde_json::to_value(obs).unwrap()
    }

    #[test]
    fn numeric_result() {
        let obs = mapped(&glucose());

        assert_eq!(obs["resourceType"], "Observation");
        assert_eq!(
            obs["identifier"],
            json!([{
                "use": "usual",
                "system": "http://hospital.example.org/identifiers/observation",
                "value": "V1|1|2345-7"
            }])
        );
        assert_eq!(obs["status"], "final");
        assert_eq!(
            obs["code"],
            json!({
                "coding": [{"system": "http://loinc.org", "code": "2345-7", "display": "Glucose"}],
                "text": "Glucose"
            })
        );
        assert_eq!(obs["subject"], json!({"reference": "urn:uuid:patient-CTRL2"}));
        assert_eq!(obs["encounter"], json!({"reference": "urn:uuid:encounter-CTRL2"}));
        assert_eq!(obs["effectiveDateTime"], "2024-01-01T08:30:00Z");
        assert_eq!(obs["valueQuantity"], json!({"value": 7.2, "unit": "mg/dL"}));
    }

    #[test]
    fn text_result_with_local_code() {
        let obs = mapped(&ObservationRecord {
            set_id: None,
            value_type: "ST".into(),
            code: "NOTE".into(),
            display: None,
            system: Some("L".into()),
            value: "hemolyzed".into(),
            units: None,
            observed_at: Some("20240101".into()),
        });

        assert!(obs.get("valueQuantity").is_none());
        assert_eq!(obs["valueString"], "hemolyzed");
        assert_eq!(obs["code"]["text"], "NOTE");
        assert!(obs["code"]["coding"][0].get("system").is_none());
        assert_eq!(obs["effectiveDateTime"], "2024-01-01");
        assert_eq!(obs["identifier"][0]["value"], "V1|?|NOTE");
    }

    #[test]
    fn quantity_without_units() {
        let obs = mapped(&ObservationRecord {
            value_type: "SN".into(),
            value: "-3".into(),
            units: None,
            ..glucose()
        });

        assert_eq!(obs["valueQuantity"], json!({"value": -3.0}));
    }

    #[rstest]
    #[case("1e999", None)]
    #[case("٧.٢", None)]
    #[case("1e999", Some("mg/dL"))]
    fn unparsable_number_keeps_only_the_unit(
        #[case] value: &str,
        #[case] units: Option<&str>,
    ) {
        let obs = mapped(&ObservationRecord {
            value: value.into(),
            units: units.map(String::from),
            ..glucose()
        });

        match units {
            Some(unit) => assert_eq!(obs["valueQuantity"], json!({"unit": unit})),
            None => assert!(obs.get("valueQuantity").is_none()),
        }
        assert!(obs.get("valueString").is_none());
    }
}
