use samdemo_core::ConfigStore;
use samdemo_sql::ExpressionBuilder;

fn main() {
    let store = ConfigStore::builtin().expect("load builtin config");
    let builder = ExpressionBuilder::new(&store);

    let e_score = builder.sector_case("es.SIC_DESCRIPTION", "esg.E", None);
    let s_score = builder.country_group_case("es.CountryOfIncorporation", "esg.S");
    let g_score = builder.country_group_case("es.CountryOfIncorporation", "esg.G");
    let overall = builder.overall_esg("E_SCORE", "S_SCORE", "G_SCORE");

    println!("E_SCORE:       {e_score}");
    println!("S_SCORE:       {s_score}");
    println!("G_SCORE:       {g_score}");
    println!("OVERALL:       {overall}");
    println!("OVERALL_GRADE: {}", builder.grade_case(&overall.to_string()));
    println!(
        "SETTLEMENT:    {}",
        builder.country_settlement_case("es.CountryOfIncorporation")
    );
    println!(
        "REBALANCING:   {}",
        builder.strategy_case("p.Strategy", "liquidity_by_strategy", "rebalancing_days")
    );
}
