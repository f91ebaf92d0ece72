pub(crate) mod adt_a01;
pub(crate) mod oru_r01;

use crate::hl7::access::{component, field, field_component, find_segment, non_empty};
use crate::hl7::normalize::ParsedMessage;
use crate::hl7::{Message, Segment};
use ErrorCode::*;
use anyhow::anyhow;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub(crate) static DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{8}$").unwrap());
pub(crate) static TIMESTAMP: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{14}$").unwrap());
pub(crate) static DATE_OR_TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{8}([0-9]{6})?$").unwrap());
pub(crate) static NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?[0-9]+(\.[0-9]+)?$").unwrap());

const REQUIRED_SEGMENTS: [&str; 3] = ["MSH", "PID", "PV1"];

/// Stable machine-readable validation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorCode {
    MissingSegment(&'static str),
    MessageTypeRequired,
    UnsupportedMessage,
    ControlIdRequired,
    MrnRequired,
    PatientNameRequired,
    BirthDateInvalid,
    VisitNumberRequired,
    AdmitDateTimeInvalid,
    ValueTypeRequired,
    ObservationCodeRequired,
    ValueRequired,
    ObservationTimeInvalid,
    NumericValueInvalid,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            MissingSegment(name) => return write!(f, "HL7_MISSING_{name}"),
            MessageTypeRequired => "HL7_MSH_9_REQUIRED",
            UnsupportedMessage => "HL7_UNSUPPORTED_MESSAGE",
            ControlIdRequired => "HL7_MSH_10_REQUIRED",
            MrnRequired => "HL7_PID_3_REQUIRED",
            PatientNameRequired => "HL7_PID_5_REQUIRED",
            BirthDateInvalid => "HL7_PID_7_INVALID",
            VisitNumberRequired => "HL7_PV1_19_REQUIRED",
            AdmitDateTimeInvalid => "HL7_PV1_44_INVALID",
            ValueTypeRequired => "HL7_OBX_2_REQUIRED",
            ObservationCodeRequired => "HL7_OBX_3_REQUIRED",
            ValueRequired => "HL7_OBX_5_REQUIRED",
            ObservationTimeInvalid => "HL7_OBX_14_INVALID",
            NumericValueInvalid => "HL7_OBX_5_INVALID_NUMERIC",
        };
        f.write_str(code)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ValidationError {
    pub(crate) code: ErrorCode,
    pub(crate) message: String,
    pub(crate) segment: Option<String>,
    pub(crate) field: Option<String>,
}

impl ValidationError {
    pub(crate) fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ValidationError {
            code,
            message: message.into(),
            segment: None,
            field: None,
        }
    }

    pub(crate) fn at(mut self, segment: &str, field: usize) -> Self {
        self.segment = Some(segment.to_owned());
        self.field = Some(field.to_string());
        self
    }

    pub(crate) fn at_segment(mut self, segment: &str) -> Self {
        self.segment = Some(segment.to_owned());
        self
    }

    /// `PID-7` style position, or just the segment name.
    pub(crate) fn location(&self) -> Option<String> {
        match (&self.segment, &self.field) {
            (Some(segment), Some(field)) => Some(format!("{segment}-{field}")),
            (Some(segment), None) => Some(segment.to_owned()),
            _ => None,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Every violation found in one validation pass. Never empty.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", join(.0))]
pub(crate) struct ValidationErrors(Vec<ValidationError>);

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    pub(crate) fn single(error: ValidationError) -> Self {
        ValidationErrors(vec![error])
    }

    pub(crate) fn from_vec(errors: Vec<ValidationError>) -> Option<Self> {
        (!errors.is_empty()).then_some(ValidationErrors(errors))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    pub(crate) fn codes(&self) -> Vec<ErrorCode> {
        self.0.iter().map(|e| e.code).collect()
    }
}

/// The two supported `code^trigger` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MessageKind {
    AdtA01,
    OruR01,
}

impl MessageKind {
    pub(crate) fn code(&self) -> &'static str {
        match self {
            MessageKind::AdtA01 => "ADT",
            MessageKind::OruR01 => "ORU",
        }
    }

    pub(crate) fn trigger(&self) -> &'static str {
        match self {
            MessageKind::AdtA01 => "A01",
            MessageKind::OruR01 => "R01",
        }
    }

    fn matches(&self, message_type: &str) -> bool {
        component(message_type, 1) == self.code() && component(message_type, 2) == self.trigger()
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}^{}", self.code(), self.trigger())
    }
}

impl FromStr for MessageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [MessageKind::AdtA01, MessageKind::OruR01]
            .into_iter()
            .find(|k| k.matches(s.trim()))
            .ok_or(anyhow!("unsupported message type: {s}"))
    }
}

/// Generic dispatch gate: looks at MSH-9 only.
pub(crate) fn require_supported_message_type(
    parsed: &ParsedMessage,
) -> Result<MessageKind, ValidationErrors> {
    let raw = parsed.header.message_type.as_deref().unwrap_or_default().trim();
    if raw.is_empty() {
        return Err(ValidationErrors::single(message_type_required()));
    }

    let kind = match parsed.message_type() {
        Some(message_type) => message_type.raw.parse(),
        None => Err(anyhow!("message type without trigger event: {raw}")),
    };
    kind.map_err(|_| {
        ValidationErrors::single(
            ValidationError::new(
                UnsupportedMessage,
                format!(
                    "Unsupported message type: {raw}. Only ADT^A01 and ORU^R01 are supported."
                ),
            )
            .at("MSH", 9),
        )
    })
}

fn message_type_required() -> ValidationError {
    ValidationError::new(MessageTypeRequired, "Missing MSH-9 message type").at("MSH", 9)
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MessageHeader {
    pub(crate) message_type: String,
    pub(crate) control_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PatientRecord {
    pub(crate) mrn: String,
    pub(crate) family_name: Option<String>,
    pub(crate) given_name: Option<String>,
    pub(crate) birth_date: Option<String>,
    pub(crate) sex: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct VisitRecord {
    pub(crate) visit_number: String,
    pub(crate) patient_class: Option<String>,
    pub(crate) admit_date_time: Option<String>,
}

/// The required segments, resolved once the presence check passed.
pub(crate) struct CoreSegments<'m> {
    pub(crate) msh: &'m Segment,
    pub(crate) pid: &'m Segment,
    pub(crate) pv1: &'m Segment,
}

/// Missing required segments are fatal: nothing can be extracted without them.
pub(crate) fn require_segments(msg: &Message) -> Result<CoreSegments<'_>, ValidationErrors> {
    let [msh, pid, pv1] = REQUIRED_SEGMENTS.map(|name| find_segment(msg, name));

    match (msh, pid, pv1) {
        (Some(msh), Some(pid), Some(pv1)) => Ok(CoreSegments { msh, pid, pv1 }),
        _ => {
            let missing = REQUIRED_SEGMENTS
                .iter()
                .zip([msh.is_none(), pid.is_none(), pv1.is_none()])
                .filter(|(_, absent)| *absent)
                .map(|(&name, _)| {
                    ValidationError::new(MissingSegment(name), format!("Missing {name} segment"))
                        .at_segment(name)
                })
                .collect();
            Err(ValidationErrors(missing))
        }
    }
}

/// Accumulates findings for one pass; never stops at the first one.
#[derive(Debug, Default)]
pub(crate) struct Checker {
    errors: Vec<ValidationError>,
}

impl Checker {
    pub(crate) fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub(crate) fn required(
        &mut self,
        value: &str,
        code: ErrorCode,
        (segment, field): (&str, usize),
        message: &str,
    ) -> String {
        if value.is_empty() {
            self.push(ValidationError::new(code, message).at(segment, field));
        }
        value.to_owned()
    }

    /// Absent is fine, malformed presence is not.
    pub(crate) fn format_if_present(
        &mut self,
        value: &str,
        pattern: &Regex,
        code: ErrorCode,
        (segment, field): (&str, usize),
        message: impl FnOnce(&str) -> String,
    ) -> Option<String> {
        let value = non_empty(value)?;
        if !pattern.is_match(&value) {
            self.push(ValidationError::new(code, message(&value)).at(segment, field));
        }
        Some(value)
    }

    pub(crate) fn finish<T>(self, record: T) -> Result<T, ValidationErrors> {
        match ValidationErrors::from_vec(self.errors) {
            Some(errors) => Err(errors),
            None => Ok(record),
        }
    }
}

pub(crate) fn check_header(msh: &Segment, expected: MessageKind, checks: &mut Checker) -> MessageHeader {
    let message_type = field(msh, 9).to_owned();
    if message_type.is_empty() {
        checks.push(message_type_required());
    } else if !expected.matches(&message_type) {
        checks.push(
            ValidationError::new(
                UnsupportedMessage,
                format!("Unsupported message type: {message_type}. Expected {expected}."),
            )
            .at("MSH", 9),
        );
    }

    let control_id = checks.required(
        field(msh, 10),
        ControlIdRequired,
        ("MSH", 10),
        "Missing MSH-10 control ID",
    );

    MessageHeader {
        message_type,
        control_id,
    }
}

pub(crate) fn check_patient(pid: &Segment, checks: &mut Checker) -> PatientRecord {
    let mrn = checks.required(
        field_component(pid, 3, 1),
        MrnRequired,
        ("PID", 3),
        "Missing MRN in PID-3 (CX.1)",
    );

    let family_name = non_empty(field_component(pid, 5, 1));
    let given_name = non_empty(field_component(pid, 5, 2));
    if family_name.is_none() && given_name.is_none() {
        checks.push(
            ValidationError::new(PatientNameRequired, "Missing patient name in PID-5").at("PID", 5),
        );
    }

    let birth_date = checks.format_if_present(
        field(pid, 7),
        &DATE,
        BirthDateInvalid,
        ("PID", 7),
        |v| format!("PID-7 must be YYYYMMDD if present. Got: \"{v}\""),
    );

    PatientRecord {
        mrn,
        family_name,
        given_name,
        birth_date,
        sex: non_empty(field(pid, 8)),
    }
}

pub(crate) fn check_visit(pv1: &Segment, checks: &mut Checker) -> VisitRecord {
    let visit_number = checks.required(
        field_component(pv1, 19, 1),
        VisitNumberRequired,
        ("PV1", 19),
        "Missing visit/encounter number in PV1-19 (CX.1)",
    );

    VisitRecord {
        visit_number,
        patient_class: non_empty(field_component(pv1, 2, 1)),
        admit_date_time: None,
    }
}
