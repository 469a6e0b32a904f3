use anchorite::perspective::{FailureMode, PerspectiveGenerator};
use anchorite::schema::Schema;

// One anchor with a historized knotted attribute and a static attribute,
// enough to exercise every column and join shape of the time traveler.
const ACTOR: &str = r#"{
    "metadata": true,
    "improved": false,
    "chronon": "datetime2(7)",
    "positorRange": "tinyint",
    "positingRange": "datetime2(7)",
    "equivalentRange": "tinyint",
    "endOfTime": "'9999-12-31 23:59:59.9999999'",
    "now": "sysdatetime()",
    "knots": [
        {
            "mnemonic": "GEN",
            "name": "GEN_Gender",
            "capsule": "dbo",
            "identityColumn": "GEN_ID",
            "valueColumn": "GEN_Gender",
            "metadataColumn": "Metadata_GEN"
        }
    ],
    "anchors": [
        {
            "mnemonic": "AC",
            "name": "AC_Actor",
            "capsule": "dbo",
            "identityColumn": "AC_ID",
            "metadataColumn": "Metadata_AC",
            "attributes": [
                {
                    "mnemonic": "GEN",
                    "name": "AC_GEN_Actor_Gender",
                    "capsule": "dbo",
                    "identityColumn": "AC_GEN_ID",
                    "anchorReference": "AC_GEN_AC_ID",
                    "valueColumn": "AC_GEN_GEN_ID",
                    "changingColumn": "AC_GEN_ChangedAt",
                    "timeRange": "datetime",
                    "positingColumn": "AC_GEN_PositedAt",
                    "positorColumn": "AC_GEN_Positor",
                    "reliabilityColumn": "AC_GEN_Reliability",
                    "reliableColumn": "AC_GEN_Reliable",
                    "metadataColumn": "Metadata_AC_GEN",
                    "knot": {
                        "mnemonic": "GEN",
                        "referenceColumn": "AC_GEN_GEN_ID",
                        "valueColumn": "AC_GEN_GEN_Gender",
                        "metadataColumn": "Metadata_AC_GEN_GEN"
                    }
                },
                {
                    "mnemonic": "NAM",
                    "name": "AC_NAM_Actor_Name",
                    "capsule": "dbo",
                    "identityColumn": "AC_NAM_ID",
                    "anchorReference": "AC_NAM_AC_ID",
                    "valueColumn": "AC_NAM_Actor_Name",
                    "positingColumn": "AC_NAM_PositedAt",
                    "positorColumn": "AC_NAM_Positor",
                    "reliabilityColumn": "AC_NAM_Reliability",
                    "reliableColumn": "AC_NAM_Reliable",
                    "metadataColumn": "Metadata_AC_NAM"
                }
            ]
        }
    ]
}"#;

fn generate(definition: &str) -> String {
    let schema = Schema::load_str(definition).expect("schema links");
    let generator = PerspectiveGenerator::new(&schema).expect("stencils parse");
    generator
        .generate(FailureMode::FailFast)
        .expect("generation ok")
        .sql
}

#[test]
fn function_head_carries_the_six_parameters() {
    let sql = generate(ACTOR);
    let head = r"CREATE FUNCTION [dbo].[tAC_Actor] (
    @positor tinyint,
    @changingTimepoint datetime2(7) = '9999-12-31 23:59:59.9999999',
    @positingTimepoint datetime2(7) = '9999-12-31 23:59:59.9999999',
    @changingVersion int = 1,
    @positingVersion int = 1,
    @reliable tinyint = 1
)
RETURNS TABLE WITH SCHEMABINDING AS RETURN";
    assert!(sql.contains(head), "head not found in:\n{sql}");
}

#[test]
fn select_lists_anchor_then_attributes_in_definition_order() {
    let sql = generate(ACTOR);
    // Knot value and knot metadata are denormalized under their exposed
    // names, and the last column carries no trailing comma.
    let select = r"SELECT
    [AC].AC_ID,
    [AC].Metadata_AC,
    [GEN].Metadata_AC_GEN,
    [GEN].AC_GEN_ID,
    [GEN].AC_GEN_ChangedAt,
    [GEN].AC_GEN_PositedAt,
    [GEN].AC_GEN_Positor,
    [GEN].AC_GEN_Reliability,
    [GEN].AC_GEN_Reliable,
    [kGEN].GEN_Gender AS AC_GEN_GEN_Gender,
    [kGEN].Metadata_GEN AS Metadata_AC_GEN_GEN,
    [GEN].AC_GEN_GEN_ID,
    [NAM].Metadata_AC_NAM,
    [NAM].AC_NAM_ID,
    [NAM].AC_NAM_PositedAt,
    [NAM].AC_NAM_Positor,
    [NAM].AC_NAM_Reliability,
    [NAM].AC_NAM_Reliable,
    [NAM].AC_NAM_Actor_Name
FROM
    [dbo].[AC_Actor] [AC]";
    assert!(sql.contains(select), "select list not found in:\n{sql}");
}

#[test]
fn joins_elide_changing_parameters_for_static_attributes() {
    let sql = generate(ACTOR);
    // The historized attribute gets all six arguments and its knot join,
    // the static one only four, and the last join closes the statement.
    let joins = r"LEFT JOIN
    [dbo].[tAC_GEN_Actor_Gender](
        @positor,
        @changingTimepoint,
        @positingTimepoint,
        @changingVersion,
        @positingVersion,
        @reliable
    ) [GEN]
ON
    [GEN].AC_GEN_AC_ID = [AC].AC_ID
LEFT JOIN
    [dbo].[GEN_Gender] [kGEN]
ON
    [kGEN].GEN_ID = [GEN].AC_GEN_GEN_ID
LEFT JOIN
    [dbo].[tAC_NAM_Actor_Name](
        @positor,
        @positingTimepoint,
        @positingVersion,
        @reliable
    ) [NAM]
ON
    [NAM].AC_NAM_AC_ID = [AC].AC_ID;
GO";
    assert!(sql.contains(joins), "join section not found in:\n{sql}");
}

#[test]
fn metadata_off_strips_every_metadata_column() {
    let plain = ACTOR.replace(r#""metadata": true"#, r#""metadata": false"#);
    let sql = generate(&plain);
    assert_eq!(sql.matches("Metadata_").count(), 0);
    // The knot value itself is still denormalized
    assert!(sql.contains("[kGEN].GEN_Gender AS AC_GEN_GEN_Gender"));
}

#[test]
fn improved_mode_adds_anchor_references_to_the_select() {
    let improved = ACTOR.replace(r#""improved": false"#, r#""improved": true"#);
    let sql = generate(&improved);
    assert!(sql.contains("    [GEN].AC_GEN_AC_ID,\n    [GEN].Metadata_AC_GEN,"));
    assert!(sql.contains("    [NAM].AC_NAM_AC_ID,\n    [NAM].Metadata_AC_NAM,"));
}
