use crate::hl7::access::{component, field, first_repetition, non_empty, segments_named};
use crate::hl7::{Message, Segment};
use crate::validate::ErrorCode::*;
use crate::validate::{
    Checker, DATE_OR_TIMESTAMP, MessageHeader, MessageKind, NUMERIC, PatientRecord,
    ValidationError, ValidationErrors, VisitRecord, check_header, check_patient, check_visit,
    require_segments,
};
use log::debug;

/// One validated OBX segment.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ObservationRecord {
    pub(crate) set_id: Option<String>,
    pub(crate) value_type: String,
    pub(crate) code: String,
    pub(crate) display: Option<String>,
    pub(crate) system: Option<String>,
    pub(crate) value: String,
    pub(crate) units: Option<String>,
    pub(crate) observed_at: Option<String>,
}

impl ObservationRecord {
    /// NM and SN results carry a quantity.
    pub(crate) fn is_numeric(&self) -> bool {
        is_numeric_type(&self.value_type)
    }
}

/// A validated ORU^R01 result report.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OruR01 {
    pub(crate) header: MessageHeader,
    pub(crate) patient: PatientRecord,
    pub(crate) visit: VisitRecord,
    pub(crate) obr_count: usize,
    pub(crate) observations: Vec<ObservationRecord>,
}

pub(crate) fn validate(msg: &Message) -> Result<OruR01, ValidationErrors> {
    let core = require_segments(msg)?;
    let mut checks = Checker::default();

    let header = check_header(core.msh, MessageKind::OruR01, &mut checks);
    let patient = check_patient(core.pid, &mut checks);
    let visit = check_visit(core.pv1, &mut checks);

    let obr_count = segments_named(msg, "OBR").count();
    if obr_count < 1 {
        checks.push(
            ValidationError::new(MissingSegment("OBR"), "ORU^R01 requires at least one OBR")
                .at_segment("OBR"),
        );
    }

    let obx_segments: Vec<&Segment> = segments_named(msg, "OBX").collect();
    if obx_segments.is_empty() {
        checks.push(
            ValidationError::new(MissingSegment("OBX"), "ORU^R01 requires at least one OBX")
                .at_segment("OBX"),
        );
    }

    let observations = obx_segments
        .iter()
        .enumerate()
        .map(|(i, obx)| check_observation(obx, i + 1, &mut checks))
        .collect();

    debug!(
        "Validated ORU^R01 [control_id={}, obr_count={obr_count}, obx_count={}]",
        header.control_id,
        obx_segments.len()
    );

    checks.finish(OruR01 {
        header,
        patient,
        visit,
        obr_count,
        observations,
    })
}

fn check_observation(obx: &Segment, position: usize, checks: &mut Checker) -> ObservationRecord {
    let coded = first_repetition(field(obx, 3));

    let value_type = checks.required(
        field(obx, 2),
        ValueTypeRequired,
        ("OBX", 2),
        &format!("Missing OBX-2 value type (OBX #{position})"),
    );
    let code = checks.required(
        component(coded, 1),
        ObservationCodeRequired,
        ("OBX", 3),
        &format!("Missing OBX-3 observation code (OBX-3.1, OBX #{position})"),
    );
    let value = checks.required(
        field(obx, 5),
        ValueRequired,
        ("OBX", 5),
        &format!("Missing OBX-5 value (OBX #{position})"),
    );
    let observed_at = checks.format_if_present(
        field(obx, 14),
        &DATE_OR_TIMESTAMP,
        ObservationTimeInvalid,
        ("OBX", 14),
        |v| {
            format!(
                "Invalid timestamp format: {v}. Expected YYYYMMDD or YYYYMMDDHHMMSS (OBX #{position})"
            )
        },
    );

    if !value.is_empty() && is_numeric_type(&value_type) && !NUMERIC.is_match(&value) {
        checks.push(
            ValidationError::new(
                NumericValueInvalid,
                format!(
                    "OBX-5 must be numeric when OBX-2 is {}. Got: \"{value}\" (OBX #{position})",
                    value_type.to_uppercase()
                ),
            )
            .at("OBX", 5),
        );
    }

    ObservationRecord {
        set_id: non_empty(field(obx, 1)),
        value_type,
        code,
        display: non_empty(component(coded, 2)),
        system: non_empty(component(coded, 3)),
        value,
        units: non_empty(component(first_repetition(field(obx, 6)), 1)),
        observed_at,
    }
}

fn is_numeric_type(value_type: &str) -> bool {
    matches!(value_type.trim().to_uppercase().as_str(), "NM" | "SN")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hl7::parse;
    use crate::validate::tests::{msh, segment};

    fn oru(results: &[String]) -> Message {
        let mut lines = vec![
            msh("ORU^R01", "CTRL2"),
            segment("PID", &[(3, "MRN1"), (5, "Doe^Jane"), (7, "19900101"), (8, "F")]),
            segment("PV1", &[(19, "V1")]),
            segment("OBR", &[(1, "1"), (4, "CBC")]),
        ];
        lines.extend_from_slice(results);
        parse(&lines.join("\r")).unwrap()
    }

    fn obx(fields: &[(usize, &str)]) -> String {
        segment("OBX", fields)
    }

    #[test]
    fn numeric_result_validates() {
        let msg = oru(&[obx(&[
            (1, "1"),
            (2, "NM"),
            (3, "2345-7^Glucose^LN"),
            (5, "7.2"),
            (6, "mg/dL"),
            (14, "20240101083000"),
        ])]);
        let record = validate(&msg).unwrap();

        assert_eq!(record.obr_count, 1);
        assert_eq!(record.patient.birth_date.as_deref(), Some("19900101"));
        assert_eq!(
            record.observations,
            vec![ObservationRecord {
                set_id: Some("1".into()),
                value_type: "NM".into(),
                code: "2345-7".into(),
                display: Some("Glucose".into()),
                system: Some("LN".into()),
                value: "7.2".into(),
                units: Some("mg/dL".into()),
                observed_at: Some("20240101083000".into()),
            }]
        );
        assert!(record.observations[0].is_numeric());
    }

    #[test]
    fn non_numeric_value_for_nm_is_the_only_error() {
        let msg = oru(&[obx(&[(1, "1"), (2, "NM"), (3, "2345-7"), (5, "abc")])]);
        let errors = validate(&msg).unwrap_err();

        assert_eq!(errors.codes(), vec![NumericValueInvalid]);
    }

    #[test]
    fn non_ascii_digits_are_not_numeric() {
        let msg = oru(&[obx(&[(1, "1"), (2, "NM"), (3, "2345-7"), (5, "٧.٢")])]);

        assert_eq!(validate(&msg).unwrap_err().codes(), vec![NumericValueInvalid]);
    }

    #[test]
    fn string_results_are_not_numeric_checked() {
        let msg = oru(&[obx(&[(2, "ST"), (3, "NOTE"), (5, "abc")])]);
        let record = validate(&msg).unwrap();

        assert_eq!(record.observations[0].set_id, None);
        assert!(!record.observations[0].is_numeric());
    }

    #[test]
    fn lowercase_sn_is_numeric_checked() {
        let msg = oru(&[obx(&[(2, "sn"), (3, "X"), (5, "1.")])]);

        assert_eq!(validate(&msg).unwrap_err().codes(), vec![NumericValueInvalid]);
    }

    #[test]
    fn per_segment_errors_accumulate_across_results() {
        let msg = oru(&[
            obx(&[(1, "1"), (3, "A"), (5, "1")]),
            obx(&[(1, "2"), (2, "NM"), (5, "-3.5")]),
            obx(&[(1, "3"), (2, "ST"), (3, "C"), (14, "2024-01-01")]),
        ]);
        let errors = validate(&msg).unwrap_err();

        assert_eq!(
            errors.codes(),
            vec![
                ValueTypeRequired,
                ObservationCodeRequired,
                ValueRequired,
                ObservationTimeInvalid
            ]
        );
        assert!(errors.iter().nth(1).unwrap().message.contains("OBX #2"));
    }

    #[test]
    fn observation_date_alone_is_accepted() {
        let msg = oru(&[obx(&[(2, "ST"), (3, "C"), (5, "x"), (14, "20240101")])]);

        assert_eq!(
            validate(&msg).unwrap().observations[0].observed_at.as_deref(),
            Some("20240101")
        );
    }

    #[test]
    fn missing_obr_and_obx_accumulate_with_field_errors() {
        let text = [
            msh("ORU^R01", "CTRL2"),
            segment("PID", &[(5, "Doe")]),
            segment("PV1", &[(19, "V1")]),
        ]
        .join("\r");
        let errors = validate(&parse(&text).unwrap()).unwrap_err();

        assert_eq!(
            errors.codes(),
            vec![MrnRequired, MissingSegment("OBR"), MissingSegment("OBX")]
        );
    }

    #[test]
    fn admission_type_is_unsupported_here() {
        let text = [
            msh("ADT^A01", "CTRL2"),
            segment("PID", &[(3, "MRN1"), (5, "Doe")]),
            segment("PV1", &[(19, "V1")]),
            segment("OBR", &[(1, "1")]),
            obx(&[(2, "ST"), (3, "C"), (5, "x")]),
        ]
        .join("\r");

        assert_eq!(
            validate(&parse(&text).unwrap()).unwrap_err().codes(),
            vec![UnsupportedMessage]
        );
    }

    #[test]
    fn keeps_source_order() {
        let msg = oru(&[
            obx(&[(1, "2"), (2, "ST"), (3, "B"), (5, "b")]),
            obx(&[(1, "1"), (2, "ST"), (3, "A"), (5, "a")]),
        ]);
        let codes: Vec<String> = validate(&msg)
            .unwrap()
            .observations
            .into_iter()
            .map(|o| o.code)
            .collect();

        assert_eq!(codes, vec!["B", "A"]);
    }
}
