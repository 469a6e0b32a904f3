//! The immutable model of an anchor schema: anchors with their attributes,
//! shared knots, and the schema-wide temporal settings. A [`Schema`] is
//! linked and validated once from a [`SchemaDef`] read out of JSON, after
//! which the generators only ever borrow it.
//!
//! Validation here is structural: identifiers must be well formed, mnemonics
//! must not collide, a knotted attribute must reference a knot that exists,
//! and historization requires a changing column and a time range together.
//! Column presence that only matters under a schema flag, such as metadata
//! columns when METADATA is on, is checked when a stencil asks for the
//! column, so one malformed anchor cannot take the rest of the run down.

use std::collections::{HashMap, HashSet};
use std::hash::BuildHasherDefault;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use seahash::SeaHasher;
use serde::Deserialize;
use tracing::debug;

use crate::error::{AnchoriteError, Result};

pub type MnemonicHasher = BuildHasherDefault<SeaHasher>;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

fn identifier(what: &str, value: &str) -> Result<()> {
    if IDENTIFIER.is_match(value) {
        Ok(())
    } else {
        Err(AnchoriteError::Schema(format!(
            "{what} '{value}' is not a valid identifier"
        )))
    }
}

// ------------- Knot -------------
/// A shared domain of values, referenced from attributes in any anchor.
#[derive(Debug)]
pub struct Knot {
    mnemonic: String,
    name: String,
    capsule: String,
    identity_column: String,
    value_column: String,
    metadata_column: Option<String>,
}
impl Knot {
    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn capsule(&self) -> &str {
        &self.capsule
    }
    pub fn identity_column(&self) -> &str {
        &self.identity_column
    }
    pub fn value_column(&self) -> &str {
        &self.value_column
    }
    pub fn metadata_column(&self) -> Option<&str> {
        self.metadata_column.as_deref()
    }
}

// ------------- Attribute -------------
// Present only on historized attributes, so the pair cannot come apart.
#[derive(Debug)]
struct Historization {
    changing_column: String,
    time_range: String,
}

// Present only on knotted attributes, holding the resolved knot and the
// column names the perspectives expose it under.
#[derive(Debug)]
struct KnotLink {
    knot: Arc<Knot>,
    reference_column: String,
    value_column: String,
    metadata_column: Option<String>,
}

/// A property of an anchor, carried in its own table. The bitemporal
/// bookkeeping columns are always present; historization, equivalence,
/// checksums and knottedness are visible through the `is_`/`has_` getters
/// and their columns come back as options.
#[derive(Debug)]
pub struct Attribute {
    mnemonic: String,
    name: String,
    capsule: String,
    identity_column: String,
    anchor_reference: String,
    value_column: String,
    positing_column: String,
    positor_column: String,
    reliability_column: String,
    reliable_column: String,
    metadata_column: Option<String>,
    equivalent_column: Option<String>,
    checksum_column: Option<String>,
    historization: Option<Historization>,
    knot: Option<KnotLink>,
}
impl Attribute {
    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn capsule(&self) -> &str {
        &self.capsule
    }
    pub fn identity_column(&self) -> &str {
        &self.identity_column
    }
    pub fn anchor_reference(&self) -> &str {
        &self.anchor_reference
    }
    pub fn value_column(&self) -> &str {
        &self.value_column
    }
    pub fn positing_column(&self) -> &str {
        &self.positing_column
    }
    pub fn positor_column(&self) -> &str {
        &self.positor_column
    }
    pub fn reliability_column(&self) -> &str {
        &self.reliability_column
    }
    pub fn reliable_column(&self) -> &str {
        &self.reliable_column
    }
    pub fn metadata_column(&self) -> Option<&str> {
        self.metadata_column.as_deref()
    }
    pub fn is_historized(&self) -> bool {
        self.historization.is_some()
    }
    pub fn changing_column(&self) -> Option<&str> {
        self.historization
            .as_ref()
            .map(|h| h.changing_column.as_str())
    }
    pub fn time_range(&self) -> Option<&str> {
        self.historization.as_ref().map(|h| h.time_range.as_str())
    }
    pub fn is_equivalent(&self) -> bool {
        self.equivalent_column.is_some()
    }
    pub fn equivalent_column(&self) -> Option<&str> {
        self.equivalent_column.as_deref()
    }
    pub fn has_checksum(&self) -> bool {
        self.checksum_column.is_some()
    }
    pub fn checksum_column(&self) -> Option<&str> {
        self.checksum_column.as_deref()
    }
    pub fn is_knotted(&self) -> bool {
        self.knot.is_some()
    }
    pub fn knot(&self) -> Option<&Knot> {
        self.knot.as_ref().map(|link| &*link.knot)
    }
    pub fn knot_reference_column(&self) -> Option<&str> {
        self.knot.as_ref().map(|link| link.reference_column.as_str())
    }
    pub fn knot_value_column(&self) -> Option<&str> {
        self.knot.as_ref().map(|link| link.value_column.as_str())
    }
    pub fn knot_metadata_column(&self) -> Option<&str> {
        self.knot.as_ref().and_then(|link| link.metadata_column.as_deref())
    }
}

// ------------- Anchor -------------
/// An identity-bearing entity. The attributes keep their definition order,
/// which is the order every perspective lists them in.
#[derive(Debug)]
pub struct Anchor {
    mnemonic: String,
    name: String,
    capsule: String,
    identity_column: String,
    metadata_column: Option<String>,
    attributes: Vec<Attribute>,
}
impl Anchor {
    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn capsule(&self) -> &str {
        &self.capsule
    }
    pub fn identity_column(&self) -> &str {
        &self.identity_column
    }
    pub fn metadata_column(&self) -> Option<&str> {
        self.metadata_column.as_deref()
    }
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }
    pub fn historized_attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter().filter(|a| a.is_historized())
    }
    pub fn has_historized_attributes(&self) -> bool {
        self.attributes.iter().any(|a| a.is_historized())
    }
}

// ------------- Schema -------------
/// The linked schema the generators run over.
#[derive(Debug)]
pub struct Schema {
    anchors: Vec<Anchor>,
    knots: Vec<Arc<Knot>>,
    metadata: bool,
    improved: bool,
    chronon: String,
    positor_range: String,
    positing_range: String,
    equivalent_range: String,
    end_of_time: String,
    now: String,
}
impl Schema {
    /// Reads a JSON schema definition and links it.
    pub fn load_str(definition: &str) -> Result<Schema> {
        let def: SchemaDef = serde_json::from_str(definition)?;
        Schema::from_def(def)
    }

    pub fn from_def(def: SchemaDef) -> Result<Schema> {
        let mut knots = Vec::with_capacity(def.knots.len());
        let mut knots_by_mnemonic: HashMap<String, Arc<Knot>, MnemonicHasher> =
            HashMap::default();
        for knot in def.knots {
            identifier("knot mnemonic", &knot.mnemonic)?;
            identifier("knot name", &knot.name)?;
            identifier("knot capsule", &knot.capsule)?;
            identifier("knot identity column", &knot.identity_column)?;
            identifier("knot value column", &knot.value_column)?;
            if let Some(column) = &knot.metadata_column {
                identifier("knot metadata column", column)?;
            }
            let linked = Arc::new(Knot {
                mnemonic: knot.mnemonic,
                name: knot.name,
                capsule: knot.capsule,
                identity_column: knot.identity_column,
                value_column: knot.value_column,
                metadata_column: knot.metadata_column,
            });
            if knots_by_mnemonic
                .insert(linked.mnemonic.clone(), Arc::clone(&linked))
                .is_some()
            {
                return Err(AnchoriteError::Schema(format!(
                    "duplicate knot mnemonic '{}'",
                    linked.mnemonic
                )));
            }
            knots.push(linked);
        }

        let mut anchors = Vec::with_capacity(def.anchors.len());
        let mut anchor_mnemonics: HashSet<String, MnemonicHasher> = HashSet::default();
        for anchor in def.anchors {
            identifier("anchor mnemonic", &anchor.mnemonic)?;
            identifier("anchor name", &anchor.name)?;
            identifier("anchor capsule", &anchor.capsule)?;
            identifier("anchor identity column", &anchor.identity_column)?;
            if let Some(column) = &anchor.metadata_column {
                identifier("anchor metadata column", column)?;
            }
            if !anchor_mnemonics.insert(anchor.mnemonic.clone()) {
                return Err(AnchoriteError::Schema(format!(
                    "duplicate anchor mnemonic '{}'",
                    anchor.mnemonic
                )));
            }

            let mut attributes = Vec::with_capacity(anchor.attributes.len());
            let mut attribute_mnemonics: HashSet<String, MnemonicHasher> = HashSet::default();
            for attribute in anchor.attributes {
                identifier("attribute mnemonic", &attribute.mnemonic)?;
                identifier("attribute name", &attribute.name)?;
                identifier("attribute capsule", &attribute.capsule)?;
                identifier("attribute identity column", &attribute.identity_column)?;
                identifier("attribute anchor reference", &attribute.anchor_reference)?;
                identifier("attribute value column", &attribute.value_column)?;
                identifier("attribute positing column", &attribute.positing_column)?;
                identifier("attribute positor column", &attribute.positor_column)?;
                identifier(
                    "attribute reliability column",
                    &attribute.reliability_column,
                )?;
                identifier("attribute reliable column", &attribute.reliable_column)?;
                if let Some(column) = &attribute.metadata_column {
                    identifier("attribute metadata column", column)?;
                }
                if let Some(column) = &attribute.equivalent_column {
                    identifier("attribute equivalent column", column)?;
                }
                if let Some(column) = &attribute.checksum_column {
                    identifier("attribute checksum column", column)?;
                }
                if let Some(column) = &attribute.changing_column {
                    identifier("attribute changing column", column)?;
                }
                if !attribute_mnemonics.insert(attribute.mnemonic.clone()) {
                    return Err(AnchoriteError::Schema(format!(
                        "duplicate attribute mnemonic '{}' in anchor '{}'",
                        attribute.mnemonic, anchor.name
                    )));
                }

                let historization = match (attribute.changing_column, attribute.time_range) {
                    (Some(changing_column), Some(time_range)) => Some(Historization {
                        changing_column,
                        time_range,
                    }),
                    (None, None) => None,
                    _ => {
                        return Err(AnchoriteError::Schema(format!(
                            "attribute '{}' must define changingColumn and timeRange together",
                            attribute.name
                        )));
                    }
                };

                let knot = match attribute.knot {
                    Some(reference) => {
                        identifier("knot reference column", &reference.reference_column)?;
                        identifier("knot value column name", &reference.value_column)?;
                        if let Some(column) = &reference.metadata_column {
                            identifier("knot metadata column name", column)?;
                        }
                        let linked = knots_by_mnemonic.get(&reference.mnemonic).ok_or_else(|| {
                            AnchoriteError::Schema(format!(
                                "attribute '{}' references unknown knot '{}'",
                                attribute.name, reference.mnemonic
                            ))
                        })?;
                        Some(KnotLink {
                            knot: Arc::clone(linked),
                            reference_column: reference.reference_column,
                            value_column: reference.value_column,
                            metadata_column: reference.metadata_column,
                        })
                    }
                    None => None,
                };

                attributes.push(Attribute {
                    mnemonic: attribute.mnemonic,
                    name: attribute.name,
                    capsule: attribute.capsule,
                    identity_column: attribute.identity_column,
                    anchor_reference: attribute.anchor_reference,
                    value_column: attribute.value_column,
                    positing_column: attribute.positing_column,
                    positor_column: attribute.positor_column,
                    reliability_column: attribute.reliability_column,
                    reliable_column: attribute.reliable_column,
                    metadata_column: attribute.metadata_column,
                    equivalent_column: attribute.equivalent_column,
                    checksum_column: attribute.checksum_column,
                    historization,
                    knot,
                });
            }

            anchors.push(Anchor {
                mnemonic: anchor.mnemonic,
                name: anchor.name,
                capsule: anchor.capsule,
                identity_column: anchor.identity_column,
                metadata_column: anchor.metadata_column,
                attributes,
            });
        }

        debug!(
            anchors = anchors.len(),
            knots = knots.len(),
            "schema linked"
        );
        Ok(Schema {
            anchors,
            knots,
            metadata: def.metadata,
            improved: def.improved,
            chronon: def.chronon,
            positor_range: def.positor_range,
            positing_range: def.positing_range,
            equivalent_range: def.equivalent_range,
            end_of_time: def.end_of_time,
            now: def.now,
        })
    }

    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }
    pub fn knots(&self) -> &[Arc<Knot>] {
        &self.knots
    }
    pub fn metadata(&self) -> bool {
        self.metadata
    }
    pub fn improved(&self) -> bool {
        self.improved
    }
    pub fn chronon(&self) -> &str {
        &self.chronon
    }
    pub fn positor_range(&self) -> &str {
        &self.positor_range
    }
    pub fn positing_range(&self) -> &str {
        &self.positing_range
    }
    pub fn equivalent_range(&self) -> &str {
        &self.equivalent_range
    }
    pub fn end_of_time(&self) -> &str {
        &self.end_of_time
    }
    pub fn now(&self) -> &str {
        &self.now
    }
}

// ------------- Definition -------------
/// The raw shape of a schema definition file. Linking it into a [`Schema`]
/// resolves knot references and validates the parts a definition can get
/// wrong on its own.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SchemaDef {
    #[serde(default)]
    pub metadata: bool,
    #[serde(default)]
    pub improved: bool,
    pub chronon: String,
    pub positor_range: String,
    pub positing_range: String,
    pub equivalent_range: String,
    pub end_of_time: String,
    pub now: String,
    #[serde(default)]
    pub knots: Vec<KnotDef>,
    #[serde(default)]
    pub anchors: Vec<AnchorDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KnotDef {
    pub mnemonic: String,
    pub name: String,
    pub capsule: String,
    pub identity_column: String,
    pub value_column: String,
    #[serde(default)]
    pub metadata_column: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AnchorDef {
    pub mnemonic: String,
    pub name: String,
    pub capsule: String,
    pub identity_column: String,
    #[serde(default)]
    pub metadata_column: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AttributeDef {
    pub mnemonic: String,
    pub name: String,
    pub capsule: String,
    pub identity_column: String,
    pub anchor_reference: String,
    pub value_column: String,
    pub positing_column: String,
    pub positor_column: String,
    pub reliability_column: String,
    pub reliable_column: String,
    #[serde(default)]
    pub metadata_column: Option<String>,
    #[serde(default)]
    pub changing_column: Option<String>,
    #[serde(default)]
    pub time_range: Option<String>,
    #[serde(default)]
    pub equivalent_column: Option<String>,
    #[serde(default)]
    pub checksum_column: Option<String>,
    #[serde(default)]
    pub knot: Option<KnotRefDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KnotRefDef {
    pub mnemonic: String,
    pub reference_column: String,
    pub value_column: String,
    #[serde(default)]
    pub metadata_column: Option<String>,
}
