use crate::client::{FhirClient, token_query};
use crate::config::AppConfig;
use crate::fhir::mapper::{FhirMapper, References, Validated};
use crate::files::{artifact_path, read_message, write_json};
use crate::hl7::normalize::{ParsedMessage, normalize};
use crate::hl7::parse;
use anyhow::Result;
use fhir_model::r4b::resources::ResourceType;
use log::{info, warn};
use serde_json::Value;
use std::path::{Path, PathBuf};

const MISSING: &str = "MISSING";
const OBSERVATION_LIMIT: usize = 20;

/// Artifacts written by an ingest run.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Ingested {
    pub(crate) bundle: PathBuf,
    pub(crate) response: Option<PathBuf>,
}

pub(crate) async fn ping_fhir(config: &AppConfig) -> Result<()> {
    let client = FhirClient::new(&config.fhir.server)?;
    let capabilities = client.capability_statement().await?;
    let software = capabilities.software.unwrap_or_default();

    println!("OK");
    println!("FHIR base: {}", config.fhir.server.base_url);
    println!(
        "FHIR version: {}",
        capabilities.fhir_version.as_deref().unwrap_or("unknown")
    );
    println!(
        "Server software: {} {}",
        software.name.as_deref().unwrap_or("unknown"),
        software.version.as_deref().unwrap_or("unknown")
    );
    Ok(())
}

pub(crate) async fn inspect(path: &Path) -> Result<()> {
    let text = read_message(path).await?;
    let parsed = normalize(&parse(&text)?);

    print_lines(&inspect_report(path, &parsed));
    Ok(())
}

pub(crate) async fn validate(config: &AppConfig, path: &Path) -> Result<()> {
    let text = read_message(path).await?;
    let validated = FhirMapper::new(config.clone())?.validate(&text)?;

    println!("OK");
    println!("file: {}", path.display());
    print_lines(&validation_report(&validated));
    Ok(())
}

/// Dry run: mapped resources with bundle-style references, nothing sent.
pub(crate) async fn map(config: &AppConfig, path: &Path) -> Result<()> {
    let text = read_message(path).await?;
    let mapper = FhirMapper::new(config.clone())?;
    let validated = mapper.validate(&text)?;
    let resources =
        mapper.map_resources(&validated, &References::bundle(validated.control_id()))?;

    println!("OK");
    println!("file: {}", path.display());
    println!("controlId: {}", validated.control_id());
    println!("resources: {}", resources.len());
    println!(
        "{}",
        serde_json::to_string_pretty(&resources.into_resources())?
    );
    Ok(())
}

pub(crate) async fn ingest(config: &AppConfig, path: &Path, dry_run: bool) -> Result<Ingested> {
    let text = read_message(path).await?;
    let (validated, bundle) = FhirMapper::new(config.clone())?.map(&text)?;
    let control_id = validated.control_id();
    let out_dir = Path::new(&config.output.dir);

    let bundle_path = artifact_path(out_dir, control_id, "bundle");
    write_json(&bundle_path, &bundle).await?;
    info!("Wrote bundle [control_id={control_id}] to {}", bundle_path.display());

    println!("OK");
    println!("wrote bundle: {}", bundle_path.display());
    println!("messageType: {}", validated.kind());
    println!("controlId: {control_id}");
    println!("mrn: {}", validated.patient().mrn);
    println!("visitNumber: {}", validated.visit().visit_number);
    println!("entries: {}", bundle.entry.len());

    if dry_run {
        info!("Dry run, transaction not posted");
        return Ok(Ingested {
            bundle: bundle_path,
            response: None,
        });
    }

    let client = FhirClient::new(&config.fhir.server)?;
    let mrn = &validated.patient().mrn;
    // informational only, the conditional PUT decides create vs update
    match client
        .find_by_identifier(ResourceType::Patient, &config.fhir.patient.system, mrn)
        .await
    {
        Ok(Some(existing)) => info!(
            "Patient [mrn={mrn}] is known as Patient/{}, updating",
            text_at(&existing, "/id").unwrap_or("(no-id)")
        ),
        Ok(None) => info!("Patient [mrn={mrn}] not found on server, creating"),
        Err(e) => warn!("Patient [mrn={mrn}] lookup failed, posting anyway: {e}"),
    }

    let response = client.post_transaction(&bundle).await?;
    info!("Posted transaction [control_id={control_id}]");

    let response_path = artifact_path(out_dir, control_id, "response");
    write_json(&response_path, &response).await?;

    println!("posted transaction: {}", config.fhir.server.base_url);
    println!("wrote response: {}", response_path.display());
    for line in response_entries(&response) {
        println!("{line}");
    }

    Ok(Ingested {
        bundle: bundle_path,
        response: Some(response_path),
    })
}

pub(crate) async fn get_patient(config: &AppConfig, mrn: &str) -> Result<()> {
    let client = FhirClient::new(&config.fhir.server)?;
    let query = token_query("identifier", &config.fhir.patient.system, mrn);
    let patient = client.expect_single(ResourceType::Patient, &query).await?;

    println!("OK");
    print_lines(&patient_summary(&patient));
    Ok(())
}

pub(crate) async fn get_encounter(config: &AppConfig, visit_number: &str) -> Result<()> {
    let client = FhirClient::new(&config.fhir.server)?;
    let query = token_query("identifier", &config.fhir.encounter.system, visit_number);
    let encounter = client.expect_single(ResourceType::Encounter, &query).await?;

    println!("OK");
    print_lines(&encounter_summary(&encounter));
    Ok(())
}

pub(crate) async fn get_observations(config: &AppConfig, mrn: &str) -> Result<()> {
    let client = FhirClient::new(&config.fhir.server)?;
    let query = token_query("subject.identifier", &config.fhir.patient.system, mrn);
    let bundle = client.search(ResourceType::Observation, &query).await?;

    println!("OK");
    println!(
        "total: {}",
        bundle.total.unwrap_or(bundle.entry.len() as u64)
    );
    for entry in bundle.entry.iter().take(OBSERVATION_LIMIT) {
        let empty = Value::Null;
        println!("{}", observation_line(entry.resource.as_ref().unwrap_or(&empty)));
    }
    Ok(())
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

fn or_missing(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(MISSING)
}

pub(crate) fn inspect_report(path: &Path, parsed: &ParsedMessage) -> Vec<String> {
    let header = &parsed.header;
    let message_type = parsed.message_type();
    let patient = parsed.patient.clone().unwrap_or_default();
    let visit = parsed.visit.clone().unwrap_or_default();
    let unknown = if parsed.unknown_segments.is_empty() {
        "(none)".to_owned()
    } else {
        parsed.unknown_segments.join(", ")
    };

    vec![
        "OK".to_owned(),
        format!("file: {}", path.display()),
        format!("messageType: {}", or_missing(&header.message_type)),
        format!(
            "messageCode: {}",
            or_missing(&message_type.as_ref().map(|t| t.code.clone()))
        ),
        format!(
            "triggerEvent: {}",
            or_missing(&message_type.as_ref().map(|t| t.trigger.clone()))
        ),
        format!("controlId: {}", or_missing(&header.control_id)),
        format!("sendingApp: {}", or_missing(&header.sending_app)),
        format!("sendingFacility: {}", or_missing(&header.sending_facility)),
        format!("timestamp: {}", or_missing(&header.timestamp)),
        format!("mrn: {}", or_missing(&patient.mrn)),
        format!(
            "name: {}",
            display_name(patient.given_name.as_deref(), patient.family_name.as_deref())
        ),
        format!("birthDate: {}", or_missing(&patient.birth_date_raw)),
        format!("sex: {}", or_missing(&patient.sex_raw)),
        format!("visitNumber: {}", or_missing(&visit.visit_number)),
        format!("patientClass: {}", or_missing(&visit.patient_class)),
        format!("admitDateTime: {}", or_missing(&visit.admit_date_time_raw)),
        format!("OBR count: {}", parsed.obrs.len()),
        format!("OBX count: {}", parsed.obxs.len()),
        format!("segments: {}", parsed.segment_names.join(", ")),
        format!("unknownSegments: {unknown}"),
    ]
}

pub(crate) fn validation_report(validated: &Validated) -> Vec<String> {
    let patient = validated.patient();
    let visit = validated.visit();
    let mut lines = vec![
        format!("messageType: {}", validated.message_type()),
        format!("controlId: {}", validated.control_id()),
        format!("mrn: {}", patient.mrn),
        format!(
            "name: {}",
            display_name(patient.given_name.as_deref(), patient.family_name.as_deref())
        ),
        format!("visitNumber: {}", visit.visit_number),
    ];

    match validated {
        Validated::Admission(adt) => {
            if let Some(admitted) = &adt.visit.admit_date_time {
                lines.push(format!("admitDateTime: {admitted}"));
            }
        }
        Validated::Results(oru) => {
            lines.push(format!("OBR count: {}", oru.obr_count));
            lines.push(format!("OBX parsed: {}", oru.observations.len()));
            for o in &oru.observations {
                let display = o.display.as_ref().map(|d| format!(" \"{d}\"")).unwrap_or_default();
                let system = o.system.as_ref().map(|s| format!(" [{s}]")).unwrap_or_default();
                let units = o.units.as_ref().map(|u| format!(" {u}")).unwrap_or_default();
                let ts = o.observed_at.as_ref().map(|t| format!(" ts={t}")).unwrap_or_default();
                lines.push(format!(
                    "- {} {}{display}{system} = {}{units}{ts}",
                    o.value_type, o.code, o.value
                ));
            }
        }
    }
    lines
}

fn display_name(given: Option<&str>, family: Option<&str>) -> String {
    let parts: Vec<&str> = [given, family].into_iter().flatten().collect();
    if parts.is_empty() {
        "(missing)".to_owned()
    } else {
        parts.join(" ")
    }
}

fn text_at<'v>(value: &'v Value, pointer: &str) -> Option<&'v str> {
    value.pointer(pointer).and_then(Value::as_str)
}

pub(crate) fn patient_summary(patient: &Value) -> Vec<String> {
    let given = patient
        .pointer("/name/0/given")
        .and_then(Value::as_array)
        .map(|g| g.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(" "))
        .filter(|g| !g.is_empty());

    vec![
        format!("Patient/{}", text_at(patient, "/id").unwrap_or("(no-id)")),
        format!(
            "name: {}",
            display_name(given.as_deref(), text_at(patient, "/name/0/family"))
        ),
        format!("gender: {}", text_at(patient, "/gender").unwrap_or("(missing)")),
        format!(
            "birthDate: {}",
            text_at(patient, "/birthDate").unwrap_or("(missing)")
        ),
    ]
}

pub(crate) fn encounter_summary(encounter: &Value) -> Vec<String> {
    vec![
        format!("Encounter/{}", text_at(encounter, "/id").unwrap_or("(no-id)")),
        format!("status: {}", text_at(encounter, "/status").unwrap_or("(missing)")),
        format!(
            "subject: {}",
            text_at(encounter, "/subject/reference").unwrap_or("(missing)")
        ),
    ]
}

pub(crate) fn observation_line(obs: &Value) -> String {
    let code = text_at(obs, "/code/coding/0/code").unwrap_or("(missing)");
    let display = text_at(obs, "/code/coding/0/display")
        .or_else(|| text_at(obs, "/code/text"))
        .map(|d| format!(" \"{d}\""))
        .unwrap_or_default();
    let value = match obs.pointer("/valueQuantity/value") {
        Some(quantity) => match text_at(obs, "/valueQuantity/unit") {
            Some(unit) => format!("{quantity} {unit}"),
            None => quantity.to_string(),
        },
        None => text_at(obs, "/valueString").unwrap_or("(missing)").to_owned(),
    };

    format!(
        "- Observation/{} code={code}{display} value={value} effective={}",
        text_at(obs, "/id").unwrap_or("(no-id)"),
        text_at(obs, "/effectiveDateTime").unwrap_or("(missing)")
    )
}

/// `status location` per transaction-response entry.
fn response_entries(response: &Value) -> Vec<String> {
    response
        .get("entry")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .map(|e| {
                    format!(
                        "- {} {}",
                        text_at(e, "/response/status").unwrap_or("(no-status)"),
                        text_at(e, "/response/location").unwrap_or("")
                    )
                    .trim_end()
                    .to_owned()
                })
                .collect()
        })
        .unwrap_or_default()
}
