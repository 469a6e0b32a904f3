use anchorite::schema::Schema;
use anchorite::stencil::{Context, StencilError, Template};

const MODEL: &str = r#"{
    "metadata": true,
    "chronon": "datetime",
    "positorRange": "tinyint",
    "positingRange": "datetime",
    "equivalentRange": "tinyint",
    "endOfTime": "'9999-12-31'",
    "now": "getdate()",
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
                    "metadataColumn": "Metadata_AC_NAM",
                    "equivalentColumn": "AC_NAM_EQ",
                    "checksumColumn": "AC_NAM_Checksum"
                }
            ]
        }
    ]
}"#;

fn setup() -> Schema {
    Schema::load_str(MODEL).expect("schema links")
}

fn render(template: &str, context: &Context) -> String {
    Template::parse(template)
        .expect("template parses")
        .render(context)
        .expect("template renders")
}

#[test]
fn properties_substitute_in_place() {
    let schema = setup();
    let context = Context::new(&schema).with_anchor(&schema.anchors()[0]);
    let out = render(
        "[$anchor.capsule].[t$anchor.name] keyed on $anchor.identityColumnName",
        &context,
    );
    assert_eq!(out, "[dbo].[tAC_Actor] keyed on AC_ID");
}

#[test]
fn a_dollar_may_close_a_property() {
    let schema = setup();
    let anchor = &schema.anchors()[0];
    let context = Context::new(&schema)
        .with_anchor(anchor)
        .with_attribute(&anchor.attributes()[0]);
    // Without the closing dollar the '.i' would be read as more path
    let out = render("'$attribute.capsule$.i$attribute.name'", &context);
    assert_eq!(out, "'dbo.iAC_GEN_Actor_Gender'");
}

#[test]
fn guarded_line_vanishes_when_the_predicate_fails() {
    let schema = setup();
    let anchor = &schema.anchors()[0];
    let template = "head\n    $(attribute.isHistorized)? $attribute.changingColumnName,\ntail";

    let gender = Context::new(&schema)
        .with_anchor(anchor)
        .with_attribute(&anchor.attributes()[0]);
    assert_eq!(render(template, &gender), "head\n    AC_GEN_ChangedAt,\ntail");

    // The whole line goes, newline included
    let name = Context::new(&schema)
        .with_anchor(anchor)
        .with_attribute(&anchor.attributes()[1]);
    assert_eq!(render(template, &name), "head\ntail");
}

#[test]
fn inline_directive_keeps_its_prefix() {
    let schema = setup();
    let context = Context::new(&schema).with_anchor(&schema.anchors()[0]);
    let template = "value $(METADATA)? with $anchor.metadataColumnName";
    assert_eq!(render(template, &context), "value with Metadata_AC");

    let bare = MODEL.replace(r#""metadata": true"#, r#""metadata": false"#);
    let schema = Schema::load_str(&bare).expect("schema links");
    let context = Context::new(&schema).with_anchor(&schema.anchors()[0]);
    assert_eq!(render(template, &context), "value ");
}

#[test]
fn alternative_branch_taken_when_the_predicate_fails() {
    let schema = setup();
    let anchor = &schema.anchors()[0];
    let template = "$(attribute.isEquivalent)? [e$attribute.name](@equivalent) : [$attribute.name]";

    let name = Context::new(&schema)
        .with_anchor(anchor)
        .with_attribute(&anchor.attributes()[1]);
    assert_eq!(render(template, &name), "[eAC_NAM_Actor_Name](@equivalent)");

    let gender = Context::new(&schema)
        .with_anchor(anchor)
        .with_attribute(&anchor.attributes()[0]);
    assert_eq!(render(template, &gender), "[AC_GEN_Actor_Gender]");
}

#[test]
fn conjunction_requires_every_term() {
    let schema = setup();
    let anchor = &schema.anchors()[0];
    let template = "$(!attribute.isKnotted && attribute.hasChecksum)? checksum";

    let name = Context::new(&schema)
        .with_anchor(anchor)
        .with_attribute(&anchor.attributes()[1]);
    assert_eq!(render(template, &name), "checksum");

    let gender = Context::new(&schema)
        .with_anchor(anchor)
        .with_attribute(&anchor.attributes()[0]);
    assert_eq!(render(template, &gender), "");
}

#[test]
fn untaken_branches_are_never_resolved() {
    let schema = setup();
    let anchor = &schema.anchors()[0];
    // No knot is bound for the name attribute, so resolving the branch
    // would fail. Skipping the line must not touch it.
    let name = Context::new(&schema)
        .with_anchor(anchor)
        .with_attribute(&anchor.attributes()[1]);
    assert_eq!(render("$(attribute.isKnotted)? $knot.valueColumnName", &name), "");
}

#[test]
fn unknown_property_is_rejected_when_parsing() {
    match Template::parse("$anchor.nickname") {
        Err(StencilError::UnknownProperty { path, line }) => {
            assert_eq!(path, "anchor.nickname");
            assert_eq!(line, 1);
        }
        other => panic!("expected unknown property, got {other:?}"),
    }
}

#[test]
fn unknown_predicate_reports_its_line() {
    match Template::parse("first line\n$(BOGUS)? gated") {
        Err(StencilError::UnknownPredicate { name, line }) => {
            assert_eq!(name, "BOGUS");
            assert_eq!(line, 2);
        }
        other => panic!("expected unknown predicate, got {other:?}"),
    }
}

#[test]
fn malformed_markup_is_a_parse_error() {
    match Template::parse("$(METADATA? gated") {
        Err(StencilError::Parse { line, .. }) => assert_eq!(line, 1),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn missing_subject_surfaces_when_rendering() {
    let schema = setup();
    let template = Template::parse("$attribute.name").expect("template parses");
    let error = template
        .render(&Context::new(&schema))
        .expect_err("no attribute is bound");
    assert_eq!(error.to_string(), "no attribute is bound in this context");
}

#[test]
fn resolution_failures_name_the_property_and_the_reason() {
    let schema = setup();
    let anchor = &schema.anchors()[0];
    let name = Context::new(&schema)
        .with_anchor(anchor)
        .with_attribute(&anchor.attributes()[1]);
    let template = Template::parse("$attribute.changingColumnName").expect("template parses");
    let error = template.render(&name).expect_err("not historized");
    assert_eq!(
        error.to_string(),
        "'$attribute.changingColumnName' cannot be resolved: the attribute is not historized"
    );
}

#[test]
fn blank_lines_pass_through() {
    let schema = setup();
    let context = Context::new(&schema);
    assert_eq!(render("a\n\nb\n", &context), "a\n\nb\n");
}

#[test]
fn rendering_is_repeatable() {
    let schema = setup();
    let anchor = &schema.anchors()[0];
    let context = Context::new(&schema)
        .with_anchor(anchor)
        .with_attribute(&anchor.attributes()[0]);
    let template = Template::parse(
        "    $(attribute.isKnotted && METADATA)? [k$attribute.mnemonic].$knot.metadataColumnName AS $attribute.knotMetadataColumnName,",
    )
    .expect("template parses");
    let first = template.render(&context).expect("template renders");
    let second = template.render(&context).expect("template renders");
    assert_eq!(first, "    [kGEN].Metadata_GEN AS Metadata_AC_GEN_GEN,");
    assert_eq!(first, second);
}
