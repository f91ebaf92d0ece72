use crate::hl7::Message;
use crate::hl7::access::field;
use crate::validate::ErrorCode::AdmitDateTimeInvalid;
use crate::validate::{
    Checker, MessageHeader, MessageKind, PatientRecord, TIMESTAMP, ValidationErrors, VisitRecord,
    check_header, check_patient, check_visit, require_segments,
};
use log::debug;

/// A validated ADT^A01 admission.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AdtA01 {
    pub(crate) header: MessageHeader,
    pub(crate) patient: PatientRecord,
    pub(crate) visit: VisitRecord,
}

pub(crate) fn validate(msg: &Message) -> Result<AdtA01, ValidationErrors> {
    let core = require_segments(msg)?;
    let mut checks = Checker::default();

    let header = check_header(core.msh, MessageKind::AdtA01, &mut checks);
    let patient = check_patient(core.pid, &mut checks);
    let mut visit = check_visit(core.pv1, &mut checks);

    visit.admit_date_time = checks.format_if_present(
        field(core.pv1, 44),
        &TIMESTAMP,
        AdmitDateTimeInvalid,
        ("PV1", 44),
        |v| format!("PV1-44 must be YYYYMMDDHHMMSS if present. Got: \"{v}\""),
    );

    debug!("Validated ADT^A01 [control_id={}]", header.control_id);

    checks.finish(AdtA01 {
        header,
        patient,
        visit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hl7::parse;
    use crate::validate::ErrorCode::*;
    use crate::validate::tests::{msh, segment};

    fn adt(pid: &[(usize, &str)], pv1: &[(usize, &str)]) -> Message {
        let text = [
            msh("ADT^A01", "CTRL1"),
            segment("EVN", &[(1, "A01")]),
            segment("PID", pid),
            segment("PV1", pv1),
        ]
        .join("\r");
        parse(&text).unwrap()
    }

    fn minimal() -> Message {
        adt(&[(3, "MRN1"), (5, "Doe^Jane")], &[(19, "V1")])
    }

    #[test]
    fn minimal_message_validates() {
        let record = validate(&minimal()).unwrap();

        assert_eq!(record.header.message_type, "ADT^A01");
        assert_eq!(record.header.control_id, "CTRL1");
        assert_eq!(record.patient.mrn, "MRN1");
        assert_eq!(record.patient.family_name.as_deref(), Some("Doe"));
        assert_eq!(record.patient.given_name.as_deref(), Some("Jane"));
        assert_eq!(record.patient.birth_date, None);
        assert_eq!(record.patient.sex, None);
        assert_eq!(record.visit.visit_number, "V1");
        assert_eq!(record.visit.admit_date_time, None);
    }

    #[test]
    fn optional_fields_are_extracted() {
        let msg = adt(
            &[(3, "MRN1^^^HOSP^MR~ALT"), (5, "Doe^Jane"), (7, "19900101"), (8, "F")],
            &[(2, "I"), (19, "V1^^^HOSP^VN"), (44, "20240101083000")],
        );
        let record = validate(&msg).unwrap();

        assert_eq!(record.patient.mrn, "MRN1");
        assert_eq!(record.patient.birth_date.as_deref(), Some("19900101"));
        assert_eq!(record.patient.sex.as_deref(), Some("F"));
        assert_eq!(record.visit.visit_number, "V1");
        assert_eq!(record.visit.patient_class.as_deref(), Some("I"));
        assert_eq!(record.visit.admit_date_time.as_deref(), Some("20240101083000"));
    }

    #[test]
    fn accumulates_instead_of_short_circuiting() {
        let msg = adt(&[(1, "1")], &[(2, "I")]);
        let errors = validate(&msg).unwrap_err();

        assert_eq!(
            errors.codes(),
            vec![MrnRequired, PatientNameRequired, VisitNumberRequired]
        );
    }

    #[test]
    fn either_name_part_is_enough() {
        let msg = adt(&[(3, "MRN1"), (5, "^Jane")], &[(19, "V1")]);

        let record = validate(&msg).unwrap();
        assert_eq!(record.patient.family_name, None);
        assert_eq!(record.patient.given_name.as_deref(), Some("Jane"));
    }

    #[test]
    fn malformed_birth_date_is_the_only_error() {
        let msg = adt(&[(3, "MRN1"), (5, "Doe^Jane"), (7, "1990-01-01")], &[(19, "V1")]);
        let errors = validate(&msg).unwrap_err();

        assert_eq!(errors.codes(), vec![BirthDateInvalid]);
        let error = errors.iter().next().unwrap();
        assert_eq!(error.segment.as_deref(), Some("PID"));
        assert_eq!(error.field.as_deref(), Some("7"));
    }

    #[test]
    fn non_ascii_birth_date_is_rejected() {
        let msg = adt(&[(3, "MRN1"), (5, "Doe"), (7, "١٩٩٠٠١٠١")], &[(19, "V1")]);

        assert_eq!(validate(&msg).unwrap_err().codes(), vec![BirthDateInvalid]);
    }

    #[test]
    fn malformed_admit_time_is_reported() {
        let msg = adt(&[(3, "MRN1"), (5, "Doe")], &[(19, "V1"), (44, "202401010830")]);

        assert_eq!(
            validate(&msg).unwrap_err().codes(),
            vec![AdmitDateTimeInvalid]
        );
    }

    #[test]
    fn wrong_message_type_is_unsupported() {
        let text = [
            msh("ORU^R01", "CTRL1"),
            segment("PID", &[(3, "MRN1"), (5, "Doe")]),
            segment("PV1", &[(19, "V1")]),
        ]
        .join("\r");

        assert_eq!(
            validate(&parse(&text).unwrap()).unwrap_err().codes(),
            vec![UnsupportedMessage]
        );
    }

    #[test]
    fn header_errors_accumulate_with_patient_errors() {
        let text = [
            msh("", ""),
            segment("PID", &[(5, "Doe")]),
            segment("PV1", &[(19, "V1")]),
        ]
        .join("\r");

        assert_eq!(
            validate(&parse(&text).unwrap()).unwrap_err().codes(),
            vec![MessageTypeRequired, ControlIdRequired, MrnRequired]
        );
    }

    #[test]
    fn missing_segment_is_fatal() {
        let text = [msh("ADT^A01", "CTRL1"), segment("PID", &[(5, "Doe")])].join("\r");
        let errors = validate(&parse(&text).unwrap()).unwrap_err();

        assert_eq!(errors.codes(), vec![MissingSegment("PV1")]);
    }

    #[test]
    fn first_pid_wins() {
        let text = [
            msh("ADT^A01", "CTRL1"),
            segment("PID", &[(3, "FIRST"), (5, "Doe")]),
            segment("PID", &[(3, "SECOND"), (5, "Roe")]),
            segment("PV1", &[(19, "V1")]),
        ]
        .join("\r");

        assert_eq!(validate(&parse(&text).unwrap()).unwrap().patient.mrn, "FIRST");
    }
}
