//! Generation of the anchor perspectives: for every anchor with at least
//! one attribute, a drop section followed by the time traveling table
//! valued function `t<name>`, the latest view `l<name>`, the point-in-time
//! function `p<name>`, the now view `n<name>`, and, when the anchor has
//! historized attributes, the difference function `d<name>`. Everything
//! else selects from `t<name>`, which does the real work of denormalizing
//! the anchor, its attributes, and their knots back into one row set.
//!
//! The DDL text is written as stencils and composed here: per-attribute
//! fragments are rendered into their own strings and joined with explicit
//! separators, so a comma or UNION can never dangle after the last element.
//! Output is a pure function of the schema. Rendering the same schema twice
//! yields byte-identical text.

use tracing::{debug, error, info};

use crate::error::{AnchoriteError, Result};
use crate::schema::{Anchor, Attribute, Schema};
use crate::stencil::{Context, StencilError, Template};

// ------------- Stencils -------------
const HEADER: &str = r"-- ANCHOR TEMPORAL PERSPECTIVES ---------------------------------------------------------------------------------------
--
-- These table valued functions simplify temporal querying by providing a temporal
-- perspective of each anchor. There are five types of perspectives: time traveling, latest,
-- point-in-time, difference, and now. They also denormalize the anchor, its attributes,
-- and referenced knots from sixth to third normal form.
--
-- The time traveling perspective shows information as it was or will be based on a number
-- of input parameters.
--
-- @positor             the view of which positor to adopt
-- @changingTimepoint   the point in changing time to travel to (defaults to End of Time)
-- @positingTimepoint   the point in positing time to travel to (defaults to End of Time)
-- @changingVersion     the version over changing time to show, 1 for current, 2 for previous, ...
-- @positingVersion     the version over positing time to show, 1 for current, 2 for previous, ...
-- @reliable            whether to show reliable (1) or unreliable (2) results
--
-- The latest perspective shows the latest available (changing & positing) information for each anchor.
-- The now perspective shows the information as it is right now, with latest positing time.
-- The point-in-time perspective lets you travel through the information to the given timepoint,
-- with latest positing time and the given point in changing time.
--
-- @changingTimepoint   the point in changing time to travel to
--
-- The difference perspective shows changes between the two given timepoints, and for
-- changes in all or a selection of attributes, with latest positing time.
--
-- @intervalStart       the start of the interval for finding changes
-- @intervalEnd         the end of the interval for finding changes
-- @selection           a list of mnemonics for tracked attributes, ie 'MNE MON ICS', or null for all
--
";

const DROP_BANNER: &str = r"-- Drop perspectives --------------------------------------------------------------------------------------------------
";

const DROP_DIFFERENCE: &str = r"IF Object_ID('d$anchor.name', 'IF') IS NOT NULL
DROP FUNCTION [$anchor.capsule].[d$anchor.name];
";

const DROP_REMAINDER: &str = r"IF Object_ID('n$anchor.name', 'V') IS NOT NULL
DROP VIEW [$anchor.capsule].[n$anchor.name];
IF Object_ID('p$anchor.name', 'IF') IS NOT NULL
DROP FUNCTION [$anchor.capsule].[p$anchor.name];
IF Object_ID('l$anchor.name', 'V') IS NOT NULL
DROP VIEW [$anchor.capsule].[l$anchor.name];
IF Object_ID('t$anchor.name', 'IF') IS NOT NULL
DROP FUNCTION [$anchor.capsule].[t$anchor.name];
GO
";

const TIME_TRAVEL_HEAD: &str = r"-- Time traveling perspective -----------------------------------------------------------------------------------------
-- t$anchor.name viewed as given by the input parameters
-----------------------------------------------------------------------------------------------------------------------
CREATE FUNCTION [$anchor.capsule].[t$anchor.name] (
    @positor $schema.positorRange,
    @changingTimepoint $schema.chronon = $schema.endOfTime,
    @positingTimepoint $schema.positingRange = $schema.endOfTime,
    @changingVersion int = 1,
    @positingVersion int = 1,
    @reliable tinyint = 1
)
RETURNS TABLE WITH SCHEMABINDING AS RETURN
SELECT
    [$anchor.mnemonic].$anchor.identityColumnName,
    $(METADATA)? [$anchor.mnemonic].$anchor.metadataColumnName,
";

const ATTRIBUTE_COLUMNS: &str = r"    $(IMPROVED)? [$attribute.mnemonic].$attribute.anchorReferenceName,
    $(METADATA)? [$attribute.mnemonic].$attribute.metadataColumnName,
    [$attribute.mnemonic].$attribute.identityColumnName,
    $(attribute.isHistorized)? [$attribute.mnemonic].$attribute.changingColumnName,
    [$attribute.mnemonic].$attribute.positingColumnName,
    [$attribute.mnemonic].$attribute.positorColumnName,
    [$attribute.mnemonic].$attribute.reliabilityColumnName,
    [$attribute.mnemonic].$attribute.reliableColumnName,
    $(attribute.isKnotted)? [k$attribute.mnemonic].$knot.valueColumnName AS $attribute.knotValueColumnName,
    $(attribute.isKnotted && METADATA)? [k$attribute.mnemonic].$knot.metadataColumnName AS $attribute.knotMetadataColumnName,
    [$attribute.mnemonic].$attribute.valueColumnName";

const TIME_TRAVEL_FROM: &str = r"FROM
    [$anchor.capsule].[$anchor.name] [$anchor.mnemonic]
";

const ATTRIBUTE_JOIN: &str = r"LEFT JOIN
    [$attribute.capsule].[t$attribute.name](
        @positor,
        $(attribute.isHistorized)? @changingTimepoint,
        @positingTimepoint,
        $(attribute.isHistorized)? @changingVersion,
        @positingVersion,
        @reliable
    ) [$attribute.mnemonic]
ON
    [$attribute.mnemonic].$attribute.anchorReferenceName = [$anchor.mnemonic].$anchor.identityColumnName";

const KNOT_JOIN: &str = r"LEFT JOIN
    [$knot.capsule].[$knot.name] [k$attribute.mnemonic]
ON
    [k$attribute.mnemonic].$knot.identityColumnName = [$attribute.mnemonic].$attribute.knotReferenceName";

const LATEST: &str = r"-- Latest perspective -------------------------------------------------------------------------------------------------
-- l$anchor.name viewed by the latest available information (may include future versions)
-----------------------------------------------------------------------------------------------------------------------
CREATE VIEW [$anchor.capsule].[l$anchor.name] AS
SELECT
    *
FROM
    [$anchor.capsule].[t$anchor.name] (
        0,
        DEFAULT,
        DEFAULT,
        DEFAULT,
        DEFAULT,
        DEFAULT
    ) [$anchor.mnemonic];
GO
";

const POINT_IN_TIME: &str = r"-- Point-in-time perspective ------------------------------------------------------------------------------------------
-- p$anchor.name viewed as it was on the given timepoint
-----------------------------------------------------------------------------------------------------------------------
CREATE FUNCTION [$anchor.capsule].[p$anchor.name] (
    @changingTimepoint $schema.chronon
)
RETURNS TABLE AS RETURN
SELECT
    *
FROM
    [$anchor.capsule].[t$anchor.name] (
        0,
        @changingTimepoint,
        DEFAULT,
        DEFAULT,
        DEFAULT,
        DEFAULT
    ) [$anchor.mnemonic];
GO
";

const NOW: &str = r"-- Now perspective ----------------------------------------------------------------------------------------------------
-- n$anchor.name viewed as it currently is (cannot include future versions)
-----------------------------------------------------------------------------------------------------------------------
CREATE VIEW [$anchor.capsule].[n$anchor.name]
AS
SELECT
    *
FROM
    [$anchor.capsule].[t$anchor.name] (
        0,
        $schema.now,
        DEFAULT,
        DEFAULT,
        DEFAULT,
        DEFAULT
    ) [$anchor.mnemonic];
GO
";

const DIFFERENCE_HEAD: &str = r"-- Difference perspective ---------------------------------------------------------------------------------------------
-- d$anchor.name showing all differences between the given timepoints and optionally for a subset of attributes
-----------------------------------------------------------------------------------------------------------------------
CREATE FUNCTION [$anchor.capsule].[d$anchor.name] (
    @intervalStart $schema.chronon,
    @intervalEnd $schema.chronon,
    @selection varchar(max) = null
)
RETURNS TABLE AS RETURN
SELECT
    timepoints.inspectedTimepoint,
    [$anchor.mnemonic].*
FROM (
";

const DIFFERENCE_BRANCH: &str = r"    SELECT DISTINCT
        $attribute.changingColumnName AS inspectedTimepoint
    FROM
        [$attribute.capsule].[$attribute.name]
    WHERE
        (@selection is null OR @selection like '%$attribute.mnemonic%')
    AND
        $attribute.changingColumnName BETWEEN @intervalStart AND @intervalEnd";

const DIFFERENCE_TAIL: &str = r") timepoints
CROSS APPLY
    [$anchor.capsule].[t$anchor.name] (
        0,
        timepoints.inspectedTimepoint,
        DEFAULT,
        DEFAULT,
        DEFAULT,
        DEFAULT
    ) [$anchor.mnemonic];
GO
";

// ------------- Generation -------------
/// What to do when one document cannot be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Log, remember the failure, and carry on with the next document.
    Isolate,
    /// Abort the whole run on the first failure.
    FailFast,
}

/// A document that could not be rendered, kept with the run it belongs to.
#[derive(Debug)]
pub struct Failure {
    pub subject: String,
    pub error: AnchoriteError,
}

/// The outcome of one generation run. Under [`FailureMode::Isolate`] the
/// SQL holds every document that rendered, and `failures` the ones that
/// did not.
#[derive(Debug)]
pub struct Generated {
    pub sql: String,
    pub failures: Vec<Failure>,
}

struct Stencils {
    header: Template,
    drop_banner: Template,
    drop_difference: Template,
    drop_remainder: Template,
    time_travel_head: Template,
    attribute_columns: Template,
    time_travel_from: Template,
    attribute_join: Template,
    knot_join: Template,
    latest: Template,
    point_in_time: Template,
    now: Template,
    difference_head: Template,
    difference_branch: Template,
    difference_tail: Template,
}

impl Stencils {
    fn parse() -> std::result::Result<Stencils, StencilError> {
        Ok(Stencils {
            header: Template::parse(HEADER)?,
            drop_banner: Template::parse(DROP_BANNER)?,
            drop_difference: Template::parse(DROP_DIFFERENCE)?,
            drop_remainder: Template::parse(DROP_REMAINDER)?,
            time_travel_head: Template::parse(TIME_TRAVEL_HEAD)?,
            attribute_columns: Template::parse(ATTRIBUTE_COLUMNS)?,
            time_travel_from: Template::parse(TIME_TRAVEL_FROM)?,
            attribute_join: Template::parse(ATTRIBUTE_JOIN)?,
            knot_join: Template::parse(KNOT_JOIN)?,
            latest: Template::parse(LATEST)?,
            point_in_time: Template::parse(POINT_IN_TIME)?,
            now: Template::parse(NOW)?,
            difference_head: Template::parse(DIFFERENCE_HEAD)?,
            difference_branch: Template::parse(DIFFERENCE_BRANCH)?,
            difference_tail: Template::parse(DIFFERENCE_TAIL)?,
        })
    }
}

/// Renders the perspective DDL for every anchor in a schema.
pub struct PerspectiveGenerator<'s> {
    schema: &'s Schema,
    stencils: Stencils,
}

impl<'s> PerspectiveGenerator<'s> {
    pub fn new(schema: &'s Schema) -> Result<Self> {
        let stencils = Stencils::parse()?;
        debug!("perspective stencils parsed");
        Ok(Self { schema, stencils })
    }

    /// Renders the run header followed by one document per anchor, in
    /// schema order, separated by blank lines.
    pub fn generate(&self, mode: FailureMode) -> Result<Generated> {
        let context = Context::new(self.schema);
        let mut sql = self.stencils.header.render(&context)?;
        let mut failures = Vec::new();
        for anchor in self.schema.anchors() {
            match self.anchor_document(anchor) {
                Ok(Some(document)) => {
                    sql.push('\n');
                    sql.push_str(&document);
                }
                Ok(None) => debug!(anchor = anchor.name(), "no attributes, nothing to emit"),
                Err(error) => match mode {
                    FailureMode::FailFast => return Err(error),
                    FailureMode::Isolate => {
                        error!(anchor = anchor.name(), %error, "anchor document abandoned");
                        failures.push(Failure {
                            subject: anchor.name().to_string(),
                            error,
                        });
                    }
                },
            }
        }
        info!(
            anchors = self.schema.anchors().len(),
            failures = failures.len(),
            "perspectives generated"
        );
        Ok(Generated { sql, failures })
    }

    /// Renders the full perspective document for one anchor, or `None` for
    /// an anchor without attributes, which has no perspectives at all. A
    /// document is returned whole or not at all.
    pub fn anchor_document(&self, anchor: &Anchor) -> Result<Option<String>> {
        if anchor.attributes().is_empty() {
            return Ok(None);
        }
        match self.build_document(anchor) {
            Ok(document) => Ok(Some(document)),
            Err(error) => Err(AnchoriteError::Anchor {
                anchor: anchor.name().to_string(),
                source: Box::new(error.into()),
            }),
        }
    }

    fn build_document(&self, anchor: &Anchor) -> std::result::Result<String, StencilError> {
        let base = Context::new(self.schema).with_anchor(anchor);
        let historized: Vec<&Attribute> = anchor.historized_attributes().collect();

        let mut document = self.stencils.drop_banner.render(&base)?;
        if !historized.is_empty() {
            document.push_str(&self.stencils.drop_difference.render(&base)?);
        }
        document.push_str(&self.stencils.drop_remainder.render(&base)?);

        document.push_str(&self.stencils.time_travel_head.render(&base)?);
        let mut columns = Vec::with_capacity(anchor.attributes().len());
        for attribute in anchor.attributes() {
            let context = base.with_attribute(attribute);
            columns.push(self.stencils.attribute_columns.render(&context)?);
        }
        document.push_str(&columns.join(",\n"));
        document.push('\n');
        document.push_str(&self.stencils.time_travel_from.render(&base)?);
        let mut joins = Vec::with_capacity(anchor.attributes().len());
        for attribute in anchor.attributes() {
            let context = base.with_attribute(attribute);
            let mut join = self.stencils.attribute_join.render(&context)?;
            if attribute.is_knotted() {
                join.push('\n');
                join.push_str(&self.stencils.knot_join.render(&context)?);
            }
            joins.push(join);
        }
        document.push_str(&joins.join("\n"));
        // A blank line sets the time traveler apart; the readers follow
        // directly on each other.
        document.push_str(";\nGO\n\n");

        document.push_str(&self.stencils.latest.render(&base)?);
        document.push_str(&self.stencils.point_in_time.render(&base)?);
        document.push_str(&self.stencils.now.render(&base)?);

        if !historized.is_empty() {
            document.push_str(&self.stencils.difference_head.render(&base)?);
            let mut branches = Vec::with_capacity(historized.len());
            for attribute in historized {
                let context = base.with_attribute(attribute);
                branches.push(self.stencils.difference_branch.render(&context)?);
            }
            document.push_str(&branches.join("\n    UNION\n"));
            document.push('\n');
            document.push_str(&self.stencils.difference_tail.render(&base)?);
        }

        Ok(document)
    }
}
