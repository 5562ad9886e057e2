use samdemo_core::ConfigStore;
use samdemo_sql::{ExpressionBuilder, SqlExpr};

fn builtin() -> ConfigStore {
    ConfigStore::builtin().expect("builtin config parses")
}

fn fixture(json: serde_json::Value) -> ConfigStore {
    serde_json::from_value(json).expect("fixture config parses")
}

fn sparse_config() -> ConfigStore {
    fixture(serde_json::json!({
        "config_version": "1.0",
        "synthetic_distributions": {
            "by_sector": {
                "Investor's Choice": { "esg": { "E": [10, 20] } },
                "Energy": { "factors": { "Value": [0.5, 2.0] } },
                "_default": { "factors": { "Carry": [-0.5, 0.5] } }
            },
            "country_groups": {
                "empty": { "countries": [], "esg": { "S": [1, 2] }, "settlement_days": 1 },
                "nordics": { "countries": ["SE", "NO"], "settlement_days": 2 }
            },
            "global": {
                "liquidity_by_strategy": {
                    "Growth": { "rebalancing_days": 90 }
                }
            }
        },
        "esg": {
            "grade_thresholds": [[80, "Leader"], [40, "Average"]],
            "default_grade": "Laggard",
            "overall_weights": { "E": 2, "S": 1, "G": 1 }
        }
    }))
}

#[test]
fn sector_case_covers_every_configured_sector_once() {
    let store = builtin();
    let builder = ExpressionBuilder::new(&store);
    let sql = builder
        .sector_case("es.SIC_DESCRIPTION", "esg.E", None)
        .to_string();

    for sector in store.accessor().configured_sectors() {
        let needle = format!("es.SIC_DESCRIPTION = '{sector}' THEN");
        assert_eq!(sql.matches(&needle).count(), 1, "sector {sector} in {sql}");
    }
    assert!(sql.contains("= 'Information Technology' THEN UNIFORM(60, 95, RANDOM())"));
    assert!(sql.contains("= 'Utilities' THEN UNIFORM(20, 60, RANDOM())"));
    // Health Care has no esg block and inherits the _default range.
    assert!(sql.contains("= 'Health Care' THEN UNIFORM(40, 80, RANDOM())"));
    assert!(sql.ends_with(" ELSE UNIFORM(40, 80, RANDOM()) END"));
}

#[test]
fn explicit_sector_list_limits_clauses() {
    let store = builtin();
    let builder = ExpressionBuilder::new(&store);
    let expr = builder.sector_case("es.SIC_DESCRIPTION", "esg.E", Some(&["Energy"][..]));
    assert_eq!(
        expr.to_string(),
        "CASE WHEN es.SIC_DESCRIPTION = 'Energy' THEN UNIFORM(15, 50, RANDOM()) \
         ELSE UNIFORM(40, 80, RANDOM()) END"
    );

    let expr = builder.sector_case("es.SIC_DESCRIPTION", "esg.E", Some(&[][..]));
    assert_eq!(expr.to_string(), "UNIFORM(40, 80, RANDOM())");
}

#[test]
fn unresolved_sector_ranges_degrade_to_null() {
    let store = sparse_config();
    let builder = ExpressionBuilder::new(&store);
    let sql = builder.sector_case("s", "esg.E", None).to_string();
    assert_eq!(
        sql,
        "CASE WHEN s = 'Investor''s Choice' THEN UNIFORM(10, 20, RANDOM()) ELSE NULL END"
    );
    assert_eq!(builder.sector_case("s", "esg.X", None), SqlExpr::case(Vec::new(), SqlExpr::Null));
    assert_eq!(builder.sector_case("s", "esg.X", None).to_string(), "NULL");
}

#[test]
fn country_group_case_uses_membership_lists() {
    let store = builtin();
    let builder = ExpressionBuilder::new(&store);
    assert_eq!(
        builder
            .country_group_case("es.CountryOfIncorporation", "esg.S")
            .to_string(),
        "CASE WHEN es.CountryOfIncorporation IN ('US', 'CA') THEN UNIFORM(50, 85, RANDOM()) \
         WHEN es.CountryOfIncorporation IN ('GB', 'DE', 'FR', 'SE', 'DK') THEN UNIFORM(60, 90, RANDOM()) \
         ELSE UNIFORM(45, 75, RANDOM()) END"
    );
}

#[test]
fn country_group_case_skips_empty_groups_and_missing_default() {
    let store = sparse_config();
    let builder = ExpressionBuilder::new(&store);
    assert_eq!(builder.country_group_case("c", "esg.S").to_string(), "NULL");
    assert_eq!(
        builder.country_settlement_case("c").to_string(),
        "CASE WHEN c IN ('SE', 'NO') THEN 2 ELSE 3 END"
    );
}

#[test]
fn settlement_case_renders_integer_literals() {
    let store = builtin();
    let builder = ExpressionBuilder::new(&store);
    assert_eq!(
        builder.country_settlement_case("c").to_string(),
        "CASE WHEN c IN ('US', 'CA') THEN 2 WHEN c IN ('GB', 'DE', 'FR', 'SE', 'DK') THEN 2 ELSE 3 END"
    );
}

#[test]
fn grade_case_is_inclusive_at_thresholds() {
    let store = builtin();
    let builder = ExpressionBuilder::new(&store);
    assert_eq!(
        builder.grade_case("E_SCORE").to_string(),
        "CASE WHEN E_SCORE >= 86 THEN 'AAA' WHEN E_SCORE >= 71 THEN 'AA' \
         WHEN E_SCORE >= 57 THEN 'A' WHEN E_SCORE >= 43 THEN 'BBB' \
         WHEN E_SCORE >= 29 THEN 'BB' WHEN E_SCORE >= 14 THEN 'B' ELSE 'CCC' END"
    );
    assert_eq!(store.esg.grade_for(86.0), "AAA");
    assert_eq!(store.esg.grade_for(85.9), "AA");
    assert_eq!(store.esg.grade_for(13.9), "CCC");
}

#[test]
fn overall_esg_normalizes_by_weight_sum() {
    let store = builtin();
    let builder = ExpressionBuilder::new(&store);
    assert_eq!(
        builder.overall_esg("E_SCORE", "S_SCORE", "G_SCORE").to_string(),
        "(1.0*E_SCORE + 1.0*S_SCORE + 1.0*G_SCORE) / 3.0"
    );

    let store = sparse_config();
    let builder = ExpressionBuilder::new(&store);
    assert_eq!(
        builder.overall_esg("e", "s", "g").to_string(),
        "(2*e + 1*s + 1*g) / 4"
    );
    let overall = builder.overall_esg("e", "s", "g").to_string();
    assert_eq!(
        builder.grade_case(&overall).to_string(),
        "CASE WHEN (2*e + 1*s + 1*g) / 4 >= 80 THEN 'Leader' \
         WHEN (2*e + 1*s + 1*g) / 4 >= 40 THEN 'Average' ELSE 'Laggard' END"
    );
}

#[test]
fn strategy_case_shape_follows_config_type() {
    let store = builtin();
    let builder = ExpressionBuilder::new(&store);
    assert_eq!(
        builder
            .strategy_case("p.Strategy", "liquidity_by_strategy", "rebalancing_days")
            .to_string(),
        "CASE WHEN p.Strategy = 'ESG' THEN 90 WHEN p.Strategy = 'Growth' THEN 90 \
         WHEN p.Strategy = 'Multi-Asset' THEN 30 ELSE 60 END"
    );
    assert_eq!(
        builder
            .strategy_case("p.Strategy", "risk_limits_by_strategy", "tracking_error_limit")
            .to_string(),
        "CASE WHEN p.Strategy = 'Growth' THEN UNIFORM(4.0, 6.0, RANDOM()) \
         WHEN p.Strategy = 'Multi-Asset' THEN UNIFORM(3.0, 5.0, RANDOM()) \
         ELSE UNIFORM(2.0, 4.0, RANDOM()) END"
    );
    assert_eq!(
        builder
            .strategy_case("p.Strategy", "risk_limits_by_strategy", "max_sector_concentration")
            .to_string(),
        "CASE WHEN p.Strategy = 'Growth' THEN 0.5 \
         WHEN p.Strategy = 'Multi-Asset' THEN 0.35 ELSE 0.4 END"
    );
}

#[test]
fn strategy_case_holds_type_branching_for_every_category() {
    let store = builtin();
    let accessor = store.accessor();
    let builder = ExpressionBuilder::new(&store);
    for category in ["liquidity_by_strategy", "risk_limits_by_strategy"] {
        let strategies = accessor.global_category(category).expect("category");
        let keys: Vec<&String> = strategies
            .values()
            .filter_map(|value| value.as_map())
            .flat_map(|params| params.keys())
            .collect();
        for key in keys {
            let sql = builder.strategy_case("p.Strategy", category, key).to_string();
            for (strategy, params) in strategies {
                if strategy == "_default" {
                    continue;
                }
                let Some(value) = params.as_map().and_then(|params| params.get(key.as_str()))
                else {
                    continue;
                };
                let clause = format!("p.Strategy = '{strategy}' THEN ");
                let start = sql.find(&clause).expect("clause present") + clause.len();
                let rhs = &sql[start..];
                if value.as_range().is_some() {
                    assert!(rhs.starts_with("UNIFORM("), "{sql}");
                } else {
                    assert!(!rhs.starts_with("UNIFORM("), "{sql}");
                }
            }
        }
    }
}

#[test]
fn strategy_case_without_default_uses_null() {
    let store = sparse_config();
    let builder = ExpressionBuilder::new(&store);
    assert_eq!(
        builder
            .strategy_case("p.Strategy", "liquidity_by_strategy", "rebalancing_days")
            .to_string(),
        "CASE WHEN p.Strategy = 'Growth' THEN 90 ELSE NULL END"
    );
    assert_eq!(builder.strategy_case("p.Strategy", "missing", "x"), SqlExpr::Null);
}

#[test]
fn global_uniform_and_factor_case() {
    let store = builtin();
    let builder = ExpressionBuilder::new(&store);
    assert_eq!(
        builder
            .global_uniform("transaction_cost_globals.commission_bps")
            .to_string(),
        "UNIFORM(1, 3, RANDOM())"
    );
    assert_eq!(
        builder.global_uniform("cash.cash_position_range_usd").to_string(),
        "UNIFORM(1000000, 25000000, RANDOM())"
    );
    assert_eq!(builder.global_uniform("tax.long_term_rate").to_string(), "NULL");
    assert_eq!(builder.global_uniform("no.such.path").to_string(), "NULL");

    assert_eq!(
        builder.factor_case("es.SIC_DESCRIPTION", "Size").to_string(),
        "UNIFORM(-1.0, 1.5, RANDOM())"
    );
    let market = builder.factor_case("es.SIC_DESCRIPTION", "Market").to_string();
    assert!(market.starts_with("CASE WHEN es.SIC_DESCRIPTION = 'Consumer Discretionary'"));
    assert!(market.ends_with("ELSE UNIFORM(0.7, 1.2, RANDOM()) END"));

    let store = sparse_config();
    let builder = ExpressionBuilder::new(&store);
    assert_eq!(
        builder.factor_case("s", "Carry").to_string(),
        "UNIFORM(-0.5, 0.5, RANDOM())"
    );
    assert_eq!(builder.factor_case("s", "Momentum").to_string(), "NULL");
}

#[test]
fn builders_are_deterministic() {
    let store = builtin();
    let first = ExpressionBuilder::new(&store)
        .factor_case("es.SIC_DESCRIPTION", "Quality")
        .to_string();
    let second = ExpressionBuilder::new(&ConfigStore::builtin().expect("reload"))
        .factor_case("es.SIC_DESCRIPTION", "Quality")
        .to_string();
    assert_eq!(first, second);
}
