use samdemo_core::{
    ConfigAccessor, ConfigStore, ConfigValue, DEFAULT_KEY, Number, Range, ResolutionPath,
};
use tracing::debug;

use crate::expr::{Condition, Literal, SqlExpr, When};

/// Settlement days used when the `_default` group does not set any.
pub const DEFAULT_SETTLEMENT_DAYS: i64 = 3;

/// Projects [`ConfigStore`] distributions into SQL expressions.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionBuilder<'a> {
    accessor: ConfigAccessor<'a>,
}

impl<'a> ExpressionBuilder<'a> {
    pub fn new(store: &'a ConfigStore) -> Self {
        Self {
            accessor: store.accessor(),
        }
    }

    pub fn accessor(&self) -> ConfigAccessor<'a> {
        self.accessor
    }

    /// `UNIFORM(min, max, RANDOM())`. Bounds are not checked.
    pub fn sql_uniform(min: impl Into<Number>, max: impl Into<Number>) -> SqlExpr {
        SqlExpr::uniform(Range::new(min, max))
    }

    /// One `WHEN column = 'sector'` branch per sector whose range resolves
    /// at `path`, falling back to the `_default` sector range (or `NULL`).
    ///
    /// `sectors` defaults to every configured sector except `_default`.
    pub fn sector_case(&self, column: &str, path: &str, sectors: Option<&[&str]>) -> SqlExpr {
        let configured;
        let sectors = match sectors {
            Some(sectors) => sectors,
            None => {
                configured = self.accessor.configured_sectors();
                configured.as_slice()
            }
        };

        let mut branches = Vec::new();
        for sector in sectors {
            match self.accessor.sector_range(sector, path) {
                Some(range) => branches.push(When::new(
                    Condition::Equals(SqlExpr::raw(column), Literal::text(*sector)),
                    SqlExpr::uniform(range),
                )),
                None => debug!(sector, path, "sector range unresolved, clause skipped"),
            }
        }

        let otherwise = self
            .accessor
            .sector_range(DEFAULT_KEY, path)
            .map(SqlExpr::uniform)
            .unwrap_or(SqlExpr::Null);

        SqlExpr::case(branches, otherwise)
    }

    /// One `WHEN column IN (...)` branch per non-empty country group whose
    /// own parameters hold a range at `path`.
    pub fn country_group_case(&self, column: &str, path: &str) -> SqlExpr {
        let path = ResolutionPath::new(path);
        let mut branches = Vec::new();
        for (name, group) in self.accessor.named_groups() {
            if group.countries.is_empty() {
                continue;
            }
            match path.resolve(&group.params).and_then(ConfigValue::as_range) {
                Some(range) => branches.push(When::new(
                    in_list(column, &group.countries),
                    SqlExpr::uniform(range),
                )),
                None => {
                    debug!(group = name, path = %path, "group range unresolved, clause skipped")
                }
            }
        }

        let otherwise = self
            .accessor
            .default_group()
            .and_then(|group| path.resolve(&group.params))
            .and_then(ConfigValue::as_range)
            .map(SqlExpr::uniform)
            .unwrap_or(SqlExpr::Null);

        SqlExpr::case(branches, otherwise)
    }

    /// Integer settlement days per country group, `3` when `_default` is silent.
    pub fn country_settlement_case(&self, column: &str) -> SqlExpr {
        let mut branches = Vec::new();
        for (_, group) in self.accessor.named_groups() {
            let days = group
                .params
                .get("settlement_days")
                .and_then(ConfigValue::as_number);
            if group.countries.is_empty() {
                continue;
            }
            if let Some(days) = days {
                branches.push(When::new(
                    in_list(column, &group.countries),
                    SqlExpr::Literal(Literal::Number(days)),
                ));
            }
        }

        let default_days = self
            .accessor
            .default_group()
            .and_then(|group| group.params.get("settlement_days"))
            .and_then(ConfigValue::as_number)
            .unwrap_or(Number::Int(DEFAULT_SETTLEMENT_DAYS));

        SqlExpr::case(branches, SqlExpr::Literal(Literal::Number(default_days)))
    }

    /// Cascading `score >= threshold` classification in descending threshold
    /// order; scores below every threshold get the default grade.
    pub fn grade_case(&self, score_expr: &str) -> SqlExpr {
        let grading = &self.accessor.store().esg;
        let branches = grading
            .grade_thresholds
            .iter()
            .map(|entry| {
                When::new(
                    Condition::AtLeast(SqlExpr::raw(score_expr), entry.threshold()),
                    SqlExpr::Literal(Literal::text(entry.label())),
                )
            })
            .collect();
        SqlExpr::case(
            branches,
            SqlExpr::Literal(Literal::text(grading.default_grade.as_str())),
        )
    }

    /// Weighted ESG average normalized by the sum of the configured weights.
    pub fn overall_esg(&self, e_expr: &str, s_expr: &str, g_expr: &str) -> SqlExpr {
        let weights = self.accessor.store().esg.overall_weights;
        SqlExpr::WeightedAverage {
            terms: vec![
                (weights.environmental, SqlExpr::raw(e_expr)),
                (weights.social, SqlExpr::raw(s_expr)),
                (weights.governance, SqlExpr::raw(g_expr)),
            ],
            divisor: weights.total(),
        }
    }

    /// Per-strategy branches under `global[category]`. The config value's
    /// type picks the branch shape: a range samples, a scalar is a literal.
    pub fn strategy_case(&self, strategy_column: &str, category: &str, key: &str) -> SqlExpr {
        let Some(strategies) = self.accessor.global_category(category) else {
            debug!(category, "strategy category missing");
            return SqlExpr::Null;
        };

        let mut branches = Vec::new();
        for (strategy, params) in strategies {
            if strategy == DEFAULT_KEY {
                continue;
            }
            let value = params
                .as_map()
                .and_then(|params| params.get(key))
                .and_then(SqlExpr::from_config);
            if let Some(then) = value {
                branches.push(When::new(
                    Condition::Equals(
                        SqlExpr::raw(strategy_column),
                        Literal::text(strategy.as_str()),
                    ),
                    then,
                ));
            }
        }

        let otherwise = strategies
            .get(DEFAULT_KEY)
            .and_then(ConfigValue::as_map)
            .and_then(|params| params.get(key))
            .and_then(SqlExpr::from_config)
            .unwrap_or(SqlExpr::Null);

        SqlExpr::case(branches, otherwise)
    }

    /// Uniform sample of the global range at `path`, or `NULL`.
    pub fn global_uniform(&self, path: &str) -> SqlExpr {
        self.accessor
            .global_range(path)
            .map(SqlExpr::uniform)
            .unwrap_or(SqlExpr::Null)
    }

    /// Factor exposure: a sector CASE when any configured sector sets the
    /// factor itself, else `global.factor_globals.<factor>`, else the
    /// `_default` sector range, else `NULL`.
    pub fn factor_case(&self, column: &str, factor: &str) -> SqlExpr {
        let path = format!("factors.{factor}");
        let lookup = ResolutionPath::new(path.as_str());
        let by_sector = &self.accessor.store().synthetic_distributions.by_sector;
        let sector_specific = by_sector
            .iter()
            .filter(|(name, _)| name.as_str() != DEFAULT_KEY)
            .any(|(_, params)| lookup.resolve(params).is_some());

        if sector_specific {
            return self.sector_case(column, &path, None);
        }

        self.accessor
            .global_range(format!("factor_globals.{factor}"))
            .or_else(|| self.accessor.sector_range(DEFAULT_KEY, path.as_str()))
            .map(SqlExpr::uniform)
            .unwrap_or(SqlExpr::Null)
    }
}

fn in_list(column: &str, countries: &[String]) -> Condition {
    Condition::InList(
        SqlExpr::raw(column),
        countries.iter().map(|code| Literal::text(code.as_str())).collect(),
    )
}
