//! Generation of the attribute interval functions: one `i<name>` table
//! valued function per historized attribute, selecting the rows whose
//! changing time falls between two given timepoints. Unlike the
//! perspectives these are created guardedly, skipped when the function
//! already exists, so the creation is wrapped in EXEC inside an
//! existence check rather than dropped and recreated.

use tracing::{debug, error, info};

use crate::error::{AnchoriteError, Result};
use crate::perspective::{Failure, FailureMode, Generated};
use crate::schema::{Anchor, Attribute, Schema};
use crate::stencil::{Context, Template};

const HEADER: &str = r"-- ATTRIBUTE INTERVALS ------------------------------------------------------------------------------------------------
--
-- These table valued functions shows all rows that have
-- been in effect between two points in changing time.
--
-- @intervalStart   the starting point in changing time
-- @intervalEnd   the ending point in changing time
--
";

const FUNCTION: &str = r"-- Attribute interval -------------------------------------------------------------------------------------------------
-- i$attribute.name interval over changing time function
-----------------------------------------------------------------------------------------------------------------------
IF Object_ID('$attribute.capsule$.i$attribute.name','IF') IS NULL
BEGIN
    EXEC('
    CREATE FUNCTION [$attribute.capsule].[i$attribute.name] (
        $(attribute.isEquivalent)? @equivalent $schema.equivalentRange,
        @intervalStart $attribute.timeRange,
        @intervalEnd $attribute.timeRange
    )
    RETURNS TABLE WITH SCHEMABINDING AS RETURN
    SELECT
        $(METADATA)? $attribute.metadataColumnName,
        $attribute.anchorReferenceName,
        $(attribute.isEquivalent)? $attribute.equivalentColumnName,
        $(!attribute.isKnotted && attribute.hasChecksum)? $attribute.checksumColumnName,
        $attribute.valueColumnName,
        $attribute.changingColumnName
    FROM
        $(attribute.isEquivalent)? [$attribute.capsule].[e$attribute.name](@equivalent) : [$attribute.capsule].[$attribute.name]
    WHERE
        $attribute.changingColumnName BETWEEN @intervalStart AND @intervalEnd;
    ');
END
GO
";

/// Renders the interval DDL for every historized attribute in a schema.
pub struct IntervalGenerator<'s> {
    schema: &'s Schema,
    header: Template,
    function: Template,
}

impl<'s> IntervalGenerator<'s> {
    pub fn new(schema: &'s Schema) -> Result<Self> {
        let header = Template::parse(HEADER)?;
        let function = Template::parse(FUNCTION)?;
        debug!("interval stencils parsed");
        Ok(Self {
            schema,
            header,
            function,
        })
    }

    /// Renders the run header followed by one document per historized
    /// attribute, anchors in schema order and attributes in definition
    /// order within each, separated by blank lines.
    pub fn generate(&self, mode: FailureMode) -> Result<Generated> {
        let context = Context::new(self.schema);
        let mut sql = self.header.render(&context)?;
        let mut failures = Vec::new();
        let mut emitted = 0usize;
        for anchor in self.schema.anchors() {
            for attribute in anchor.attributes() {
                match self.attribute_document(anchor, attribute) {
                    Ok(Some(document)) => {
                        sql.push('\n');
                        sql.push_str(&document);
                        emitted += 1;
                    }
                    Ok(None) => {
                        debug!(attribute = attribute.name(), "not historized, no interval")
                    }
                    Err(error) => match mode {
                        FailureMode::FailFast => return Err(error),
                        FailureMode::Isolate => {
                            error!(
                                attribute = attribute.name(),
                                %error,
                                "interval document abandoned"
                            );
                            failures.push(Failure {
                                subject: attribute.name().to_string(),
                                error,
                            });
                        }
                    },
                }
            }
        }
        info!(
            intervals = emitted,
            failures = failures.len(),
            "intervals generated"
        );
        Ok(Generated { sql, failures })
    }

    /// Renders the interval function for one attribute, or `None` when the
    /// attribute is not historized and has no interval to offer.
    pub fn attribute_document(
        &self,
        anchor: &Anchor,
        attribute: &Attribute,
    ) -> Result<Option<String>> {
        if !attribute.is_historized() {
            return Ok(None);
        }
        let context = Context::new(self.schema)
            .with_anchor(anchor)
            .with_attribute(attribute);
        match self.function.render(&context) {
            Ok(document) => Ok(Some(document)),
            Err(error) => Err(AnchoriteError::Attribute {
                attribute: attribute.name().to_string(),
                source: Box::new(error.into()),
            }),
        }
    }
}
