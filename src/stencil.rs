//! Stencil is the directive markup in which the DDL fragments are written.
//!
//! A stencil is parsed once into a small syntax tree and can then be rendered
//! any number of times against a [`Context`], which binds at most one anchor,
//! attribute, and knot from a [`Schema`](crate::schema::Schema). Rendering is
//! pure text substitution: property references such as `$anchor.name` resolve
//! through a fixed registry of typed accessors, and conditional directives
//! such as `$(METADATA)? ...` keep or omit the remainder of their line.
//!
//! Directives are line scoped. When a directive is the first non-blank
//! content of its line and its predicate fails with no alternative branch,
//! the whole line disappears from the output, newline included. When text
//! precedes the directive, only the trailing fragment is omitted. Branches
//! that are not taken are never resolved, so a line guarded by
//! `$(attribute.isKnotted)?` may safely reference `$knot` properties.
//!
//! Unknown properties and predicates are rejected when the stencil is
//! parsed, with the line number they appear on. Resolution failures, such
//! as asking a non-historized attribute for its changing column, surface
//! when rendering.

use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

use crate::schema::{Anchor, Attribute, Knot, Schema};

#[derive(Parser)]
#[grammar = "stencil.pest"]
struct StencilParser;

#[derive(Error, Debug)]
pub enum StencilError {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("line {line}: unknown property '${path}'")]
    UnknownProperty { path: String, line: usize },
    #[error("line {line}: unknown predicate '{name}'")]
    UnknownPredicate { name: String, line: usize },
    #[error("'${path}' cannot be resolved: {reason}")]
    Unresolvable { path: String, reason: &'static str },
    #[error("no {subject} is bound in this context")]
    MissingSubject { subject: &'static str },
}

/// Everything a property reference may point at. The registry is closed:
/// a token that does not map to a variant is rejected at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Property {
    SchemaChronon,
    SchemaPositorRange,
    SchemaPositingRange,
    SchemaEquivalentRange,
    SchemaEndOfTime,
    SchemaNow,
    AnchorMnemonic,
    AnchorName,
    AnchorCapsule,
    AnchorIdentityColumn,
    AnchorMetadataColumn,
    AttributeMnemonic,
    AttributeName,
    AttributeCapsule,
    AttributeIdentityColumn,
    AttributeAnchorReference,
    AttributeValueColumn,
    AttributeChangingColumn,
    AttributeTimeRange,
    AttributePositingColumn,
    AttributePositorColumn,
    AttributeReliabilityColumn,
    AttributeReliableColumn,
    AttributeMetadataColumn,
    AttributeEquivalentColumn,
    AttributeChecksumColumn,
    AttributeKnotReference,
    AttributeKnotValueColumn,
    AttributeKnotMetadataColumn,
    KnotMnemonic,
    KnotName,
    KnotCapsule,
    KnotIdentityColumn,
    KnotValueColumn,
    KnotMetadataColumn,
}

impl Property {
    fn from_path(path: &str) -> Option<Property> {
        Some(match path {
            "schema.chronon" => Property::SchemaChronon,
            "schema.positorRange" => Property::SchemaPositorRange,
            "schema.positingRange" => Property::SchemaPositingRange,
            "schema.equivalentRange" => Property::SchemaEquivalentRange,
            "schema.endOfTime" => Property::SchemaEndOfTime,
            "schema.now" => Property::SchemaNow,
            "anchor.mnemonic" => Property::AnchorMnemonic,
            "anchor.name" => Property::AnchorName,
            "anchor.capsule" => Property::AnchorCapsule,
            "anchor.identityColumnName" => Property::AnchorIdentityColumn,
            "anchor.metadataColumnName" => Property::AnchorMetadataColumn,
            "attribute.mnemonic" => Property::AttributeMnemonic,
            "attribute.name" => Property::AttributeName,
            "attribute.capsule" => Property::AttributeCapsule,
            "attribute.identityColumnName" => Property::AttributeIdentityColumn,
            "attribute.anchorReferenceName" => Property::AttributeAnchorReference,
            "attribute.valueColumnName" => Property::AttributeValueColumn,
            "attribute.changingColumnName" => Property::AttributeChangingColumn,
            "attribute.timeRange" => Property::AttributeTimeRange,
            "attribute.positingColumnName" => Property::AttributePositingColumn,
            "attribute.positorColumnName" => Property::AttributePositorColumn,
            "attribute.reliabilityColumnName" => Property::AttributeReliabilityColumn,
            "attribute.reliableColumnName" => Property::AttributeReliableColumn,
            "attribute.metadataColumnName" => Property::AttributeMetadataColumn,
            "attribute.equivalentColumnName" => Property::AttributeEquivalentColumn,
            "attribute.checksumColumnName" => Property::AttributeChecksumColumn,
            "attribute.knotReferenceName" => Property::AttributeKnotReference,
            "attribute.knotValueColumnName" => Property::AttributeKnotValueColumn,
            "attribute.knotMetadataColumnName" => Property::AttributeKnotMetadataColumn,
            "knot.mnemonic" => Property::KnotMnemonic,
            "knot.name" => Property::KnotName,
            "knot.capsule" => Property::KnotCapsule,
            "knot.identityColumnName" => Property::KnotIdentityColumn,
            "knot.valueColumnName" => Property::KnotValueColumn,
            "knot.metadataColumnName" => Property::KnotMetadataColumn,
            _ => return None,
        })
    }
}

/// The predicates a directive may test, singly or joined with `&&`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flag {
    Metadata,
    Improved,
    Historized,
    Knotted,
    Equivalent,
    Checksum,
}

impl Flag {
    fn from_name(name: &str) -> Option<Flag> {
        Some(match name {
            "METADATA" => Flag::Metadata,
            "IMPROVED" => Flag::Improved,
            "attribute.isHistorized" => Flag::Historized,
            "attribute.isKnotted" => Flag::Knotted,
            "attribute.isEquivalent" => Flag::Equivalent,
            "attribute.hasChecksum" => Flag::Checksum,
            _ => return None,
        })
    }

    fn holds(&self, context: &Context) -> Result<bool, StencilError> {
        match self {
            Flag::Metadata => Ok(context.schema.metadata()),
            Flag::Improved => Ok(context.schema.improved()),
            Flag::Historized => Ok(context.bound_attribute()?.is_historized()),
            Flag::Knotted => Ok(context.bound_attribute()?.is_knotted()),
            Flag::Equivalent => Ok(context.bound_attribute()?.is_equivalent()),
            Flag::Checksum => Ok(context.bound_attribute()?.has_checksum()),
        }
    }
}

#[derive(Debug)]
enum Piece {
    Text(String),
    Property { path: String, property: Property },
}

#[derive(Debug)]
struct Term {
    negated: bool,
    flag: Flag,
}

#[derive(Debug)]
struct Predicate {
    terms: Vec<Term>,
}

impl Predicate {
    // A conjunction, so the first failing term settles it.
    fn holds(&self, context: &Context) -> Result<bool, StencilError> {
        for term in &self.terms {
            if term.flag.holds(context)? == term.negated {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[derive(Debug)]
struct Directive {
    predicate: Predicate,
    when_true: Vec<Piece>,
    when_false: Option<Vec<Piece>>,
}

#[derive(Debug)]
struct Line {
    pieces: Vec<Piece>,
    directive: Option<Directive>,
    // the directive is the first non-blank content of the line
    guarded: bool,
    newline: bool,
}

impl Line {
    fn render_into(&self, out: &mut String, context: &Context) -> Result<(), StencilError> {
        let mut rendered = String::new();
        append(&mut rendered, &self.pieces, context)?;
        if let Some(directive) = &self.directive {
            if directive.predicate.holds(context)? {
                append(&mut rendered, &directive.when_true, context)?;
            } else if let Some(alternative) = &directive.when_false {
                append(&mut rendered, alternative, context)?;
            } else if self.guarded {
                return Ok(());
            }
        }
        out.push_str(&rendered);
        if self.newline {
            out.push('\n');
        }
        Ok(())
    }
}

fn append(out: &mut String, pieces: &[Piece], context: &Context) -> Result<(), StencilError> {
    for piece in pieces {
        match piece {
            Piece::Text(text) => out.push_str(text),
            Piece::Property { path, property } => out.push_str(context.resolve(*property, path)?),
        }
    }
    Ok(())
}

/// A parsed stencil, ready to be rendered against any number of contexts.
#[derive(Debug)]
pub struct Template {
    lines: Vec<Line>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Template, StencilError> {
        let mut lines = Vec::new();
        for (index, raw) in source.split_inclusive('\n').enumerate() {
            let newline = raw.ends_with('\n');
            let content = if newline { &raw[..raw.len() - 1] } else { raw };
            lines.push(parse_line(content, index + 1, newline)?);
        }
        Ok(Template { lines })
    }

    /// Renders the whole stencil, or nothing: the output is only returned
    /// when every line resolved.
    pub fn render(&self, context: &Context) -> Result<String, StencilError> {
        let mut out = String::new();
        for line in &self.lines {
            line.render_into(&mut out, context)?;
        }
        Ok(out)
    }
}

fn parse_line(content: &str, number: usize, newline: bool) -> Result<Line, StencilError> {
    let parsed = StencilParser::parse(Rule::line, content).map_err(|e| StencilError::Parse {
        line: number,
        message: e.variant.message().into_owned(),
    })?;
    let mut pieces = Vec::new();
    let mut directive = None;
    for top in parsed {
        for pair in top.into_inner() {
            match pair.as_rule() {
                Rule::text => pieces.push(Piece::Text(pair.as_str().to_string())),
                Rule::property => pieces.push(parse_property(pair.as_str(), number)?),
                Rule::directive => directive = Some(parse_directive(pair, number)?),
                _ => (),
            }
        }
    }
    let guarded = pieces
        .iter()
        .all(|piece| matches!(piece, Piece::Text(text) if text.trim().is_empty()));
    Ok(Line {
        pieces,
        directive,
        guarded,
        newline,
    })
}

fn parse_property(token: &str, line: usize) -> Result<Piece, StencilError> {
    let path = token.trim_matches('$').to_string();
    match Property::from_path(&path) {
        Some(property) => Ok(Piece::Property { path, property }),
        None => Err(StencilError::UnknownProperty { path, line }),
    }
}

fn parse_directive(
    pair: pest::iterators::Pair<Rule>,
    line: usize,
) -> Result<Directive, StencilError> {
    let mut predicate = Predicate { terms: Vec::new() };
    let mut when_true = Vec::new();
    let mut when_false = None;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::predicate => predicate = parse_predicate(part, line)?,
            Rule::then_branch => when_true = parse_branch(part, line)?,
            Rule::else_branch => when_false = Some(parse_branch(part, line)?),
            _ => (),
        }
    }
    Ok(Directive {
        predicate,
        when_true,
        when_false,
    })
}

fn parse_branch(
    pair: pest::iterators::Pair<Rule>,
    line: usize,
) -> Result<Vec<Piece>, StencilError> {
    let mut pieces = Vec::new();
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::branch_text => pieces.push(Piece::Text(part.as_str().to_string())),
            Rule::property => pieces.push(parse_property(part.as_str(), line)?),
            _ => (),
        }
    }
    Ok(pieces)
}

fn parse_predicate(
    pair: pest::iterators::Pair<Rule>,
    line: usize,
) -> Result<Predicate, StencilError> {
    let mut terms = Vec::new();
    for term in pair.into_inner() {
        let mut negated = false;
        for part in term.into_inner() {
            match part.as_rule() {
                Rule::negation => negated = true,
                Rule::flag => {
                    let name = part.as_str();
                    match Flag::from_name(name) {
                        Some(flag) => terms.push(Term { negated, flag }),
                        None => {
                            return Err(StencilError::UnknownPredicate {
                                name: name.to_string(),
                                line,
                            });
                        }
                    }
                }
                _ => (),
            }
        }
    }
    Ok(Predicate { terms })
}

/// The subjects a rendering resolves against. Binding an attribute also
/// binds its knot, when it has one, so knot properties resolve without a
/// separate step.
#[derive(Clone, Copy)]
pub struct Context<'c> {
    schema: &'c Schema,
    anchor: Option<&'c Anchor>,
    attribute: Option<&'c Attribute>,
    knot: Option<&'c Knot>,
}

impl<'c> Context<'c> {
    pub fn new(schema: &'c Schema) -> Self {
        Self {
            schema,
            anchor: None,
            attribute: None,
            knot: None,
        }
    }

    pub fn with_anchor(self, anchor: &'c Anchor) -> Self {
        Self {
            anchor: Some(anchor),
            ..self
        }
    }

    pub fn with_attribute(self, attribute: &'c Attribute) -> Self {
        Self {
            attribute: Some(attribute),
            knot: attribute.knot(),
            ..self
        }
    }

    fn bound_anchor(&self) -> Result<&'c Anchor, StencilError> {
        self.anchor
            .ok_or(StencilError::MissingSubject { subject: "anchor" })
    }

    fn bound_attribute(&self) -> Result<&'c Attribute, StencilError> {
        self.attribute.ok_or(StencilError::MissingSubject {
            subject: "attribute",
        })
    }

    fn bound_knot(&self) -> Result<&'c Knot, StencilError> {
        self.knot
            .ok_or(StencilError::MissingSubject { subject: "knot" })
    }

    fn resolve(&self, property: Property, path: &str) -> Result<&'c str, StencilError> {
        match property {
            Property::SchemaChronon => Ok(self.schema.chronon()),
            Property::SchemaPositorRange => Ok(self.schema.positor_range()),
            Property::SchemaPositingRange => Ok(self.schema.positing_range()),
            Property::SchemaEquivalentRange => Ok(self.schema.equivalent_range()),
            Property::SchemaEndOfTime => Ok(self.schema.end_of_time()),
            Property::SchemaNow => Ok(self.schema.now()),
            Property::AnchorMnemonic => Ok(self.bound_anchor()?.mnemonic()),
            Property::AnchorName => Ok(self.bound_anchor()?.name()),
            Property::AnchorCapsule => Ok(self.bound_anchor()?.capsule()),
            Property::AnchorIdentityColumn => Ok(self.bound_anchor()?.identity_column()),
            Property::AnchorMetadataColumn => required(
                self.bound_anchor()?.metadata_column(),
                path,
                "no metadata column is defined",
            ),
            Property::AttributeMnemonic => Ok(self.bound_attribute()?.mnemonic()),
            Property::AttributeName => Ok(self.bound_attribute()?.name()),
            Property::AttributeCapsule => Ok(self.bound_attribute()?.capsule()),
            Property::AttributeIdentityColumn => Ok(self.bound_attribute()?.identity_column()),
            Property::AttributeAnchorReference => Ok(self.bound_attribute()?.anchor_reference()),
            Property::AttributeValueColumn => Ok(self.bound_attribute()?.value_column()),
            Property::AttributeChangingColumn => required(
                self.bound_attribute()?.changing_column(),
                path,
                "the attribute is not historized",
            ),
            Property::AttributeTimeRange => required(
                self.bound_attribute()?.time_range(),
                path,
                "the attribute is not historized",
            ),
            Property::AttributePositingColumn => Ok(self.bound_attribute()?.positing_column()),
            Property::AttributePositorColumn => Ok(self.bound_attribute()?.positor_column()),
            Property::AttributeReliabilityColumn => {
                Ok(self.bound_attribute()?.reliability_column())
            }
            Property::AttributeReliableColumn => Ok(self.bound_attribute()?.reliable_column()),
            Property::AttributeMetadataColumn => required(
                self.bound_attribute()?.metadata_column(),
                path,
                "no metadata column is defined",
            ),
            Property::AttributeEquivalentColumn => required(
                self.bound_attribute()?.equivalent_column(),
                path,
                "no equivalent column is defined",
            ),
            Property::AttributeChecksumColumn => required(
                self.bound_attribute()?.checksum_column(),
                path,
                "no checksum column is defined",
            ),
            Property::AttributeKnotReference => required(
                self.bound_attribute()?.knot_reference_column(),
                path,
                "the attribute is not knotted",
            ),
            Property::AttributeKnotValueColumn => required(
                self.bound_attribute()?.knot_value_column(),
                path,
                "the attribute is not knotted",
            ),
            Property::AttributeKnotMetadataColumn => required(
                self.bound_attribute()?.knot_metadata_column(),
                path,
                "no knot metadata column is defined",
            ),
            Property::KnotMnemonic => Ok(self.bound_knot()?.mnemonic()),
            Property::KnotName => Ok(self.bound_knot()?.name()),
            Property::KnotCapsule => Ok(self.bound_knot()?.capsule()),
            Property::KnotIdentityColumn => Ok(self.bound_knot()?.identity_column()),
            Property::KnotValueColumn => Ok(self.bound_knot()?.value_column()),
            Property::KnotMetadataColumn => required(
                self.bound_knot()?.metadata_column(),
                path,
                "no metadata column is defined",
            ),
        }
    }
}

fn required<'c>(
    value: Option<&'c str>,
    path: &str,
    reason: &'static str,
) -> Result<&'c str, StencilError> {
    value.ok_or_else(|| StencilError::Unresolvable {
        path: path.to_string(),
        reason,
    })
}
