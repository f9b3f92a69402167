/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

use anyhow::{bail, Context};
use sctp_mux::MuxConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MESSAGES: usize = 10;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub mux: MuxConfig,
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
    pub associations: Vec<AssociationRun>,
}

/// One encoder/decoder pair to drive through the pipeline.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AssociationRun {
    pub id: u16,
    #[serde(default = "default_messages")]
    pub messages: usize,
    #[serde(default)]
    pub stream_id: u16,
    #[serde(default)]
    pub ppid: u32,
}

fn default_delivery_timeout_ms() -> u64 {
    DEFAULT_DELIVERY_TIMEOUT_MS
}

fn default_messages() -> usize {
    DEFAULT_MESSAGES
}

impl RunConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.mux.validate().context("invalid mux settings")?;

        if self.associations.is_empty() {
            bail!("at least one association must be configured");
        }
        if self.associations.len() > self.mux.max_associations {
            bail!(
                "{} associations configured but max-associations is {}",
                self.associations.len(),
                self.mux.max_associations
            );
        }

        let mut seen = HashSet::new();
        for association in &self.associations {
            if !seen.insert(association.id) {
                bail!("association id {} is configured twice", association.id);
            }
        }
        Ok(())
    }
}

pub fn load(path: &Path) -> anyhow::Result<RunConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("unable to read config file {}", path.display()))?;
    let config: RunConfig = json5::from_str(&data)
        .with_context(|| format!("unable to parse config file {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::load;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(temp_dir: &TempDir, contents: &str) -> std::path::PathBuf {
        let path = temp_dir.path().join("run.json5");
        fs::write(&path, contents).expect("write fixture");
        path
    }

    #[test]
    fn loads_json5_with_comments_and_defaults() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let path = write_config(
            &temp_dir,
            r#"{
                // two pairs
                mux: { "high-watermark": 8 },
                associations: [ { id: 1 }, { id: 2, messages: 3, ppid: 51 }, ],
            }"#,
        );

        let config = load(&path).expect("load");
        assert_eq!(config.mux.high_watermark, 8);
        assert_eq!(config.mux.max_associations, 1024);
        assert_eq!(config.delivery_timeout_ms, 5_000);
        assert_eq!(config.associations[0].messages, 10);
        assert_eq!(config.associations[1].messages, 3);
        assert_eq!(config.associations[1].ppid, 51);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let path = write_config(&temp_dir, "{ associations: [ { id: 4 }, { id: 4 } ] }");

        let err = load(&path).expect_err("duplicate ids");
        assert!(err.to_string().contains("configured twice"));
    }

    #[test]
    fn more_pairs_than_the_registry_allows_is_rejected() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let path = write_config(
            &temp_dir,
            r#"{ mux: { "max-associations": 1 }, associations: [ { id: 1 }, { id: 2 } ] }"#,
        );

        assert!(load(&path).is_err());
    }

    #[test]
    fn unknown_fields_fail_to_parse() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let path = write_config(&temp_dir, "{ associations: [ { id: 1, colour: 3 } ] }");

        let err = load(&path).expect_err("unknown field");
        assert!(format!("{err:#}").contains("unable to parse"));
    }

    #[test]
    fn missing_file_is_reported() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let err = load(&temp_dir.path().join("absent.json5")).expect_err("missing");
        assert!(err.to_string().contains("unable to read"));
    }
}
