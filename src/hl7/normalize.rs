use crate::hl7::Message;
use crate::hl7::access::{component, field, field_component, find_segment, non_empty, segments_named};
use std::collections::BTreeSet;

const KNOWN_SEGMENTS: [&str; 5] = ["MSH", "PID", "PV1", "OBR", "OBX"];

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct HeaderModel {
    pub(crate) message_type: Option<String>,
    pub(crate) control_id: Option<String>,
    pub(crate) sending_app: Option<String>,
    pub(crate) sending_facility: Option<String>,
    pub(crate) timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct PatientModel {
    pub(crate) mrn: Option<String>,
    pub(crate) family_name: Option<String>,
    pub(crate) given_name: Option<String>,
    pub(crate) birth_date_raw: Option<String>,
    pub(crate) sex_raw: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct VisitModel {
    pub(crate) visit_number: Option<String>,
    pub(crate) patient_class: Option<String>,
    pub(crate) admit_date_time_raw: Option<String>,
}

/// Optional-field view of a message. Nothing here is enforced.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ParsedMessage {
    pub(crate) header: HeaderModel,
    pub(crate) patient: Option<PatientModel>,
    pub(crate) visit: Option<VisitModel>,
    pub(crate) obrs: Vec<String>,
    pub(crate) obxs: Vec<String>,
    pub(crate) segment_names: Vec<String>,
    pub(crate) unknown_segments: Vec<String>,
}

/// MSH-9 split into message code and trigger event.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MessageTypeRef {
    pub(crate) code: String,
    pub(crate) trigger: String,
    pub(crate) raw: String,
}

impl ParsedMessage {
    pub(crate) fn message_type(&self) -> Option<MessageTypeRef> {
        let raw = self.header.message_type.as_deref()?.trim();
        let code = component(raw, 1);
        let trigger = component(raw, 2);
        if code.is_empty() || trigger.is_empty() {
            return None;
        }

        Some(MessageTypeRef {
            code: code.to_owned(),
            trigger: trigger.to_owned(),
            raw: raw.to_owned(),
        })
    }
}

pub(crate) fn normalize(msg: &Message) -> ParsedMessage {
    let header = find_segment(msg, "MSH")
        .map(|msh| HeaderModel {
            message_type: non_empty(field(msh, 9)),
            control_id: non_empty(field(msh, 10)),
            sending_app: non_empty(field(msh, 3)),
            sending_facility: non_empty(field(msh, 4)),
            timestamp: non_empty(field(msh, 7)),
        })
        .unwrap_or_default();

    let patient = find_segment(msg, "PID").map(|pid| PatientModel {
        mrn: non_empty(field_component(pid, 3, 1)),
        family_name: non_empty(field_component(pid, 5, 1)),
        given_name: non_empty(field_component(pid, 5, 2)),
        birth_date_raw: non_empty(field(pid, 7)),
        sex_raw: non_empty(field(pid, 8)),
    });

    let visit = find_segment(msg, "PV1").map(|pv1| VisitModel {
        visit_number: non_empty(field_component(pv1, 19, 1)),
        patient_class: non_empty(field_component(pv1, 2, 1)),
        admit_date_time_raw: non_empty(field(pv1, 44)),
    });

    let segment_names: Vec<String> = msg.segments.iter().map(|s| s.name.clone()).collect();
    let unknown_segments = segment_names
        .iter()
        .filter(|n| !KNOWN_SEGMENTS.contains(&n.as_str()))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    ParsedMessage {
        header,
        patient,
        visit,
        obrs: segments_named(msg, "OBR").map(|s| s.raw.clone()).collect(),
        obxs: segments_named(msg, "OBX").map(|s| s.raw.clone()).collect(),
        segment_names,
        unknown_segments,
    }
}
