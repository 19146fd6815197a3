//! Host capability probing
//!
//! Pure parsers over host/guest capability signals: meminfo text, firmware
//! image directories, and the control plane's domain-capability XML. The
//! only I/O in this module is listing the caller-supplied firmware search
//! directories; everything else operates on supplied text.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;
use vmgate_common::{CapabilityReport, DomainCaps, Error, FirmwarePair, MemoryReport, Result};

/// Extract integer KiB values from `Label: value kB` lines.
///
/// Lines that don't match the form are skipped, not errors; meminfo
/// carries counters in other units that the gate does not care about.
pub fn parse_meminfo(text: &str) -> BTreeMap<String, u64> {
    let mut fields = BTreeMap::new();
    for line in text.lines() {
        let Some((label, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(value) = rest.trim().strip_suffix("kB") else {
            continue;
        };
        if let Ok(kib) = value.trim().parse::<u64>() {
            fields.insert(label.trim().to_string(), kib);
        }
    }
    fields
}

/// Build a MemoryReport from meminfo text; MemTotal and MemAvailable are
/// required fields.
pub fn memory_report(text: &str) -> Result<MemoryReport> {
    let fields = parse_meminfo(text);
    let total_kib = *fields
        .get("MemTotal")
        .ok_or_else(|| Error::Parse("meminfo is missing MemTotal".to_string()))?;
    let available_kib = *fields
        .get("MemAvailable")
        .ok_or_else(|| Error::Parse("meminfo is missing MemAvailable".to_string()))?;
    Ok(MemoryReport {
        total_kib,
        available_kib,
    })
}

/// Pure candidate selection over one directory listing.
///
/// A complete pair is a code image plus a vars store in the same
/// directory; the secure-boot-capable code image wins over the generic
/// one when both are present.
pub fn pick_firmware_pair(names: &[String]) -> Option<(String, String, bool)> {
    let is_code = |n: &str| n.starts_with("OVMF_CODE") && n.ends_with(".fd");
    let is_vars = |n: &str| n.starts_with("OVMF_VARS") && n.ends_with(".fd");

    let secure = names
        .iter()
        .find(|n| is_code(n) && n.contains("secboot"));
    let generic = names
        .iter()
        .find(|n| is_code(n) && !n.contains("secboot"));
    let code = secure.or(generic)?;
    let vars = names.iter().find(|n| is_vars(n))?;

    Some((code.clone(), vars.clone(), secure.is_some()))
}

/// Scan directories in caller-given priority order; the first directory
/// containing a complete matched pair wins.
pub fn select_firmware_pair(search_dirs: &[PathBuf]) -> Result<FirmwarePair> {
    for dir in search_dirs {
        let Ok(entries) = std::fs::read_dir(dir) else {
            debug!("firmware dir {:?} not readable, skipping", dir);
            continue;
        };
        let names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();

        if let Some((code, vars, secure_boot)) = pick_firmware_pair(&names) {
            debug!("selected firmware pair {}/{} in {:?}", code, vars, dir);
            return Ok(FirmwarePair {
                code: dir.join(code),
                vars: dir.join(vars),
                secure_boot,
            });
        }
    }

    Err(Error::not_found(
        "firmware pair",
        format!("no complete code/vars pair under {:?}", search_dirs),
    ))
}

/// Parse the control plane's domain-capability XML into capability flags.
pub fn parse_domain_capabilities(xml: &str) -> Result<DomainCaps> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut caps = DomainCaps::default();
    let mut saw_root = false;
    let mut in_loader = false;
    let mut loader_supported = false;
    let mut secure_enum_allows_yes = false;
    let mut in_tpm = false;
    let mut current_enum: Option<String> = None;
    let mut in_value = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"domainCapabilities" => saw_root = true,
                b"loader" => {
                    in_loader = true;
                    loader_supported = attr_is_yes(&e, b"supported")?;
                }
                b"tpm" => {
                    in_tpm = true;
                    caps.tpm_supported = attr_is_yes(&e, b"supported")?;
                }
                b"enum" => current_enum = attr_value(&e, b"name")?,
                b"value" => in_value = true,
                _ => {}
            },
            // Self-closing elements never produce a matching End, so they
            // carry attributes but must not open a section.
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"domainCapabilities" => saw_root = true,
                b"loader" => loader_supported = attr_is_yes(&e, b"supported")?,
                b"tpm" => caps.tpm_supported = attr_is_yes(&e, b"supported")?,
                _ => {}
            },
            Ok(Event::Text(t)) if in_value => {
                let text = t
                    .unescape()
                    .map_err(|e| Error::Parse(format!("capability XML: {}", e)))?
                    .trim()
                    .to_string();
                match (in_loader, in_tpm, current_enum.as_deref()) {
                    (true, _, Some("secure")) if text == "yes" => secure_enum_allows_yes = true,
                    (_, true, Some("model")) => {
                        caps.tpm_models.insert(text);
                    }
                    (_, true, Some("backendModel")) => {
                        caps.tpm_backends.insert(text);
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"loader" => {
                    in_loader = false;
                    current_enum = None;
                }
                b"tpm" => {
                    in_tpm = false;
                    current_enum = None;
                }
                b"enum" => current_enum = None,
                b"value" => in_value = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(Error::Parse(format!("capability XML: {}", e))),
        }
    }

    if !saw_root {
        return Err(Error::Parse(
            "capability XML has no domainCapabilities root".to_string(),
        ));
    }

    caps.secure_loader_supported = loader_supported && secure_enum_allows_yes;
    Ok(caps)
}

fn attr_is_yes(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Result<bool> {
    Ok(attr_value(e, key)?.as_deref() == Some("yes"))
}

fn attr_value(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| Error::Parse(format!("capability XML: {}", e)))?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|e| Error::Parse(format!("capability XML: {}", e)))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Assemble a full capability report from already-fetched inputs.
pub fn capability_report(
    meminfo_text: &str,
    firmware_dirs: &[PathBuf],
    capabilities_xml: &str,
) -> Result<CapabilityReport> {
    Ok(CapabilityReport {
        memory: memory_report(meminfo_text)?,
        firmware: select_firmware_pair(firmware_dirs)?,
        domain: parse_domain_capabilities(capabilities_xml)?,
    })
}

/// Gate predicate over a capability report. The guest image is a modern
/// Windows build and will not boot without secure boot and a TPM.
pub fn check_capabilities(report: &CapabilityReport, min_available_kib: u64) -> Result<()> {
    if report.memory.available_kib < min_available_kib {
        return Err(Error::Preflight(format!(
            "host has {} KiB available, gate requires {} KiB",
            report.memory.available_kib, min_available_kib
        )));
    }
    if !report.domain.secure_loader_supported {
        return Err(Error::Preflight(
            "domain does not support a secure loader".to_string(),
        ));
    }
    if !report.domain.tpm_supported {
        return Err(Error::Preflight("domain does not support a TPM".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CAPS_XML: &str = r#"
<domainCapabilities>
  <os supported='yes'>
    <loader supported='yes'>
      <value>/usr/share/OVMF/OVMF_CODE.fd</value>
      <enum name='type'>
        <value>rom</value>
        <value>pflash</value>
      </enum>
      <enum name='secure'>
        <value>yes</value>
        <value>no</value>
      </enum>
    </loader>
  </os>
  <devices>
    <tpm supported='yes'>
      <enum name='model'>
        <value>tpm-tis</value>
        <value>tpm-crb</value>
      </enum>
      <enum name='backendModel'>
        <value>passthrough</value>
        <value>emulator</value>
      </enum>
    </tpm>
  </devices>
</domainCapabilities>
"#;

    #[test]
    fn meminfo_extracts_kib_fields() {
        let fields = parse_meminfo("MemTotal: 16303824 kB\nMemAvailable: 8123456 kB\n");
        assert_eq!(fields.get("MemTotal"), Some(&16303824));
        assert_eq!(fields.get("MemAvailable"), Some(&8123456));
    }

    #[test]
    fn meminfo_skips_unparsable_lines() {
        let text = "MemTotal:       16303824 kB\n\
                    HugePages_Total:       0\n\
                    garbage line\n\
                    MemAvailable:    8123456 kB\n";
        let report = memory_report(text).unwrap();
        assert_eq!(report.total_kib, 16303824);
        assert_eq!(report.available_kib, 8123456);
        assert_eq!(parse_meminfo(text).len(), 2);
    }

    #[test]
    fn meminfo_without_required_fields_is_parse_error() {
        let err = memory_report("MemTotal: 1024 kB\n").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn secure_code_image_preferred() {
        let names = vec![
            "OVMF_CODE.fd".to_string(),
            "OVMF_CODE.secboot.fd".to_string(),
            "OVMF_VARS.fd".to_string(),
        ];
        let (code, vars, secure) = pick_firmware_pair(&names).unwrap();
        assert_eq!(code, "OVMF_CODE.secboot.fd");
        assert_eq!(vars, "OVMF_VARS.fd");
        assert!(secure);
    }

    #[test]
    fn code_without_vars_is_not_a_pair() {
        let names = vec!["OVMF_CODE.fd".to_string()];
        assert!(pick_firmware_pair(&names).is_none());
    }

    #[test]
    fn first_directory_with_complete_pair_wins() {
        let tmp = TempDir::new().unwrap();
        let incomplete = tmp.path().join("a");
        let complete = tmp.path().join("b");
        std::fs::create_dir_all(&incomplete).unwrap();
        std::fs::create_dir_all(&complete).unwrap();
        std::fs::write(incomplete.join("OVMF_CODE.fd"), b"").unwrap();
        std::fs::write(complete.join("OVMF_CODE.fd"), b"").unwrap();
        std::fs::write(complete.join("OVMF_VARS.fd"), b"").unwrap();

        let missing = tmp.path().join("does-not-exist");
        let pair =
            select_firmware_pair(&[missing, incomplete, complete.clone()]).unwrap();
        assert_eq!(pair.code, complete.join("OVMF_CODE.fd"));
        assert_eq!(pair.vars, complete.join("OVMF_VARS.fd"));
        assert!(!pair.secure_boot);
    }

    #[test]
    fn no_directory_yields_a_pair() {
        let tmp = TempDir::new().unwrap();
        let err = select_firmware_pair(&[tmp.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn domain_capabilities_flags_and_sets() {
        let caps = parse_domain_capabilities(CAPS_XML).unwrap();
        assert!(caps.secure_loader_supported);
        assert!(caps.tpm_supported);
        assert!(caps.tpm_models.contains("tpm-crb"));
        assert!(caps.tpm_backends.contains("emulator"));
    }

    #[test]
    fn self_closing_tpm_does_not_capture_later_enums() {
        let xml = r#"
<domainCapabilities>
  <os supported='yes'>
    <loader supported='yes'>
      <enum name='secure'><value>yes</value></enum>
    </loader>
  </os>
  <devices>
    <tpm supported='yes'/>
    <video supported='yes'>
      <enum name='model'><value>virtio</value></enum>
    </video>
  </devices>
</domainCapabilities>
"#;
        let caps = parse_domain_capabilities(xml).unwrap();
        assert!(caps.tpm_supported);
        // The video model enum follows the self-closing tpm element and
        // must not be attributed to it.
        assert!(caps.tpm_models.is_empty());
        assert!(caps.tpm_backends.is_empty());
        assert!(caps.secure_loader_supported);
    }

    #[test]
    fn malformed_capability_xml_is_parse_error() {
        assert!(matches!(
            parse_domain_capabilities("<domainCapabilities><os></domainCapabilities>"),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            parse_domain_capabilities("not xml at all"),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn capability_check_thresholds() {
        let report = CapabilityReport {
            memory: MemoryReport {
                total_kib: 16_000_000,
                available_kib: 8_000_000,
            },
            firmware: FirmwarePair {
                code: "/fw/OVMF_CODE.secboot.fd".into(),
                vars: "/fw/OVMF_VARS.fd".into(),
                secure_boot: true,
            },
            domain: parse_domain_capabilities(CAPS_XML).unwrap(),
        };

        assert!(check_capabilities(&report, 4 * 1024 * 1024).is_ok());
        assert!(matches!(
            check_capabilities(&report, 9_000_000),
            Err(Error::Preflight(_))
        ));
    }
}
