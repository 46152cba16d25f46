//! Canonical status vocabulary and normalization rules
//!
//! Carrier pages and the tracking sheet hold free-form Spanish status phrases
//! ("Tu mercancía está en camino", "Entregado al destinatario"). This module
//! reduces them to a closed vocabulary so alerting and write-back work on codes
//! instead of prose. The keyword tables ship with sensible built-ins and can be
//! extended from JSON files named in the configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::StatusMapConfig;
use crate::error::{Error, Result};

/// Closed vocabulary of canonical parcel states
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CanonicalStatus {
    /// Delivered to the recipient
    Entregado,
    /// Somewhere between origin and destination
    EnTransito,
    /// Not yet admitted by the carrier
    Pendiente,
    /// Returned or returning to the sender
    Devuelto,
    /// Waiting for pickup at a carrier agency
    EnAgencia,
    /// Label created, parcel not yet handed over
    GuiaGenerada,
}

impl CanonicalStatus {
    /// The code as written into sheets and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalStatus::Entregado => "ENTREGADO",
            CanonicalStatus::EnTransito => "EN_TRANSITO",
            CanonicalStatus::Pendiente => "PENDIENTE",
            CanonicalStatus::Devuelto => "DEVUELTO",
            CanonicalStatus::EnAgencia => "EN_AGENCIA",
            CanonicalStatus::GuiaGenerada => "GUIA_GENERADA",
        }
    }
}

impl std::fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Case-fold and trim a status string for comparison.
///
/// This is the normalization both the reconciler's equality rule and the
/// keyword matching below operate on.
///
/// # Examples
///
/// ```
/// use parcel_sync::status_map::normalize;
///
/// assert_eq!(normalize("  Entregado "), "entregado");
/// assert_eq!(normalize("EN TRÁNSITO"), "en tránsito");
/// ```
#[must_use]
pub fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Override phrases checked before any keyword table.
///
/// "Pendiente por admitir" phrasings would otherwise hit the generic
/// "pendiente" keyword anyway, but keeping them first insulates the
/// classification from reorderings of the keyword table.
const BUILTIN_OVERRIDES: &[(&str, CanonicalStatus)] = &[
    ("envío pendiente por admitir", CanonicalStatus::Pendiente),
    ("envio pendiente por admitir", CanonicalStatus::Pendiente),
    ("pendiente por admitir", CanonicalStatus::Pendiente),
];

/// Built-in keyword table, matched by containment in declaration order.
///
/// Order carries meaning: "pendiente de devolución" classifies as PENDIENTE
/// because "pendiente" is listed before "devolución".
const BUILTIN_KEYWORDS: &[(&str, CanonicalStatus)] = &[
    ("entregado", CanonicalStatus::Entregado),
    ("transito", CanonicalStatus::EnTransito),
    ("tránsito", CanonicalStatus::EnTransito),
    ("camino", CanonicalStatus::EnTransito),
    ("ruta", CanonicalStatus::EnTransito),
    ("centro", CanonicalStatus::EnTransito),
    ("pendiente", CanonicalStatus::Pendiente),
    ("origen", CanonicalStatus::Pendiente),
    ("recibimos", CanonicalStatus::EnTransito),
    ("devuelto", CanonicalStatus::Devuelto),
    ("devolución", CanonicalStatus::Devuelto),
    ("retorno", CanonicalStatus::Devuelto),
    ("agencia", CanonicalStatus::EnAgencia),
    ("recoger", CanonicalStatus::EnAgencia),
    ("guia_generada", CanonicalStatus::GuiaGenerada),
    ("guía generada", CanonicalStatus::GuiaGenerada),
    ("preparado_para_transportadora", CanonicalStatus::GuiaGenerada),
    ("preparado para transportadora", CanonicalStatus::GuiaGenerada),
];

/// Maps free-form status phrases to [`CanonicalStatus`] codes
///
/// Resolution runs over the normalized input, all rules by substring
/// containment, first hit wins: override phrases, then keywords loaded from
/// configuration files, then the built-in keyword table. Any other non-blank
/// phrase falls back to `EN_TRANSITO`; blank input is `PENDIENTE`.
///
/// # Examples
///
/// ```
/// use parcel_sync::status_map::{CanonicalStatus, StatusMap};
///
/// let map = StatusMap::default();
/// assert_eq!(map.canonicalize("Entregado al destinatario"), CanonicalStatus::Entregado);
/// assert_eq!(map.canonicalize(""), CanonicalStatus::Pendiente);
/// ```
#[derive(Clone, Debug)]
pub struct StatusMap {
    overrides: Vec<(String, CanonicalStatus)>,
    keywords: Vec<(String, CanonicalStatus)>,
}

impl Default for StatusMap {
    fn default() -> Self {
        Self {
            overrides: owned_rules(BUILTIN_OVERRIDES),
            keywords: owned_rules(BUILTIN_KEYWORDS),
        }
    }
}

impl StatusMap {
    /// Build the map from configuration, merging any extension files.
    ///
    /// Entries loaded from files take precedence over the built-ins of the
    /// same layer.
    pub fn from_config(config: &StatusMapConfig) -> Result<Self> {
        let mut map = StatusMap::default();
        if let Some(path) = &config.overrides_path {
            let mut loaded = load_rules(path, "status_map.overrides_path")?;
            loaded.extend(map.overrides);
            map.overrides = loaded;
        }
        if let Some(path) = &config.keywords_path {
            let mut loaded = load_rules(path, "status_map.keywords_path")?;
            loaded.extend(map.keywords);
            map.keywords = loaded;
        }
        Ok(map)
    }

    /// Reduce a raw status phrase to its canonical code.
    pub fn canonicalize(&self, raw: &str) -> CanonicalStatus {
        let text = normalize(raw);
        if text.is_empty() {
            return CanonicalStatus::Pendiente;
        }
        for (phrase, status) in self.overrides.iter().chain(self.keywords.iter()) {
            if text.contains(phrase.as_str()) {
                return *status;
            }
        }
        tracing::debug!(status = raw, "unrecognized carrier status, treating as EN_TRANSITO");
        CanonicalStatus::EnTransito
    }

    /// Whether a scraped status should raise the alert flag for a row.
    ///
    /// Alerts fire when the canonical recorded and scraped codes disagree, so
    /// cosmetic phrasing drift ("En camino" vs "En tránsito") stays quiet. Rows
    /// with a blank recorded status never alert; the report's "newly observed"
    /// classification covers those.
    pub fn should_alert(&self, recorded: &str, scraped: &str) -> bool {
        if normalize(recorded).is_empty() {
            return false;
        }
        self.canonicalize(recorded) != self.canonicalize(scraped)
    }
}

fn owned_rules(rules: &[(&str, CanonicalStatus)]) -> Vec<(String, CanonicalStatus)> {
    rules
        .iter()
        .map(|(phrase, status)| ((*phrase).to_string(), *status))
        .collect()
}

/// Load a rule file: a JSON object keyed by canonical status with keyword
/// arrays as values, e.g. `{"DEVUELTO": ["siniestro", "extraviado"]}`.
fn load_rules(path: &Path, key: &str) -> Result<Vec<(String, CanonicalStatus)>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::config(
            format!("failed to read status map file {}: {e}", path.display()),
            key,
        )
    })?;
    let parsed: BTreeMap<CanonicalStatus, Vec<String>> =
        serde_json::from_str(&text).map_err(|e| {
            Error::config(
                format!("invalid status map file {}: {e}", path.display()),
                key,
            )
        })?;
    let mut rules = Vec::new();
    for (status, phrases) in parsed {
        for phrase in phrases {
            rules.push((normalize(&phrase), status));
        }
    }
    Ok(rules)
}
