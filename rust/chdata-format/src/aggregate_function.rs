//! The catalog of aggregate functions accepted by `AggregateFunction(...)` columns.

use std::{str::FromStr, sync::OnceLock};

use chdata_common::{Result, error::Error};

use crate::catalog::{Entry, NameCatalog};

macro_rules! aggregate_functions {
    ($($variant:ident($name:literal, $case:expr $(, $alias:literal)*)),* $(,)?) => {
        /// An aggregate function known to the server.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum AggregateFunction {
            $($variant),*
        }

        impl AggregateFunction {
            pub const ALL: &'static [AggregateFunction] = &[$(AggregateFunction::$variant),*];

            /// The function name as the server spells it.
            pub fn name(self) -> &'static str {
                match self {
                    $(AggregateFunction::$variant => $name,)*
                }
            }

            pub fn is_case_sensitive(self) -> bool {
                match self {
                    $(AggregateFunction::$variant => $case,)*
                }
            }

            pub fn aliases(self) -> &'static [&'static str] {
                match self {
                    $(AggregateFunction::$variant => &[$($alias),*],)*
                }
            }
        }
    };
}

aggregate_functions! {
    AggThrow("aggThrow", false),
    Any("any", false),
    AnyHeavy("anyHeavy", false),
    AnyLast("anyLast", false),
    ArgMax("argMax", false),
    ArgMin("argMin", false),
    Avg("avg", true),
    AvgWeighted("avgWeighted", false),
    BoundingRatio("boundingRatio", false),
    CategoricalInformationValue("categoricalInformationValue", false),
    Corr("corr", true),
    CorrStable("corrStable", false),
    Count("count", true),
    CovarPop("covarPop", false, "COVAR_POP"),
    CovarPopStable("covarPopStable", false),
    CovarSamp("covarSamp", false, "COVAR_SAMP"),
    CovarSampStable("covarSampStable", false),
    DeltaSum("deltaSum", false),
    DeltaSumTimestamp("deltaSumTimestamp", false),
    DenseRank("dense_rank", true),
    Entropy("entropy", false),
    ExponentialMovingAverage("exponentialMovingAverage", false),
    ExponentialTimeDecayedAvg("exponentialTimeDecayedAvg", false),
    ExponentialTimeDecayedCount("exponentialTimeDecayedCount", false),
    ExponentialTimeDecayedMax("exponentialTimeDecayedMax", false),
    ExponentialTimeDecayedSum("exponentialTimeDecayedSum", false),
    FirstValue("first_value", true),
    GroupArray("groupArray", false),
    GroupArrayInsertAt("groupArrayInsertAt", false),
    GroupArrayMovingAvg("groupArrayMovingAvg", false),
    GroupArrayMovingSum("groupArrayMovingSum", false),
    GroupArraySample("groupArraySample", false),
    GroupBitAnd("groupBitAnd", false, "BIT_AND"),
    GroupBitOr("groupBitOr", false, "BIT_OR"),
    GroupBitXor("groupBitXor", false, "BIT_XOR"),
    GroupBitmap("groupBitmap", false),
    GroupBitmapAnd("groupBitmapAnd", false),
    GroupBitmapOr("groupBitmapOr", false),
    GroupBitmapXor("groupBitmapXor", false),
    GroupUniqArray("groupUniqArray", false),
    Histogram("histogram", false),
    IntervalLengthSum("intervalLengthSum", false),
    KurtPop("kurtPop", false),
    KurtSamp("kurtSamp", false),
    LagInFrame("lagInFrame", false),
    LastValue("last_value", true),
    LeadInFrame("leadInFrame", false),
    MannWhitneyUTest("mannWhitneyUTest", false),
    Max("max", true),
    MaxIntersections("maxIntersections", false),
    MaxIntersectionsPosition("maxIntersectionsPosition", false),
    MaxMappedArrays("maxMappedArrays", false),
    Min("min", true),
    MinMappedArrays("minMappedArrays", false),
    Quantile("quantile", false, "median"),
    QuantileBFloat16("quantileBFloat16", false, "medianBFloat16"),
    QuantileBFloat16Weighted("quantileBFloat16Weighted", false, "medianBFloat16Weighted"),
    QuantileDeterministic("quantileDeterministic", false, "medianDeterministic"),
    QuantileExact("quantileExact", false, "medianExact"),
    QuantileExactExclusive("quantileExactExclusive", false),
    QuantileExactHigh("quantileExactHigh", false, "medianExactHigh"),
    QuantileExactInclusive("quantileExactInclusive", false),
    QuantileExactLow("quantileExactLow", false, "medianExactLow"),
    QuantileExactWeighted("quantileExactWeighted", false, "medianExactWeighted"),
    QuantileTDigest("quantileTDigest", false, "medianTDigest"),
    QuantileTDigestWeighted("quantileTDigestWeighted", false, "medianTDigestWeighted"),
    QuantileTiming("quantileTiming", false, "medianTiming"),
    QuantileTimingWeighted("quantileTimingWeighted", false, "medianTimingWeighted"),
    Quantiles("quantiles", false),
    QuantilesBFloat16("quantilesBFloat16", false),
    QuantilesBFloat16Weighted("quantilesBFloat16Weighted", false),
    QuantilesDeterministic("quantilesDeterministic", false),
    QuantilesExact("quantilesExact", false),
    QuantilesExactExclusive("quantilesExactExclusive", false),
    QuantilesExactHigh("quantilesExactHigh", false),
    QuantilesExactInclusive("quantilesExactInclusive", false),
    QuantilesExactLow("quantilesExactLow", false),
    QuantilesExactWeighted("quantilesExactWeighted", false),
    QuantilesTDigest("quantilesTDigest", false),
    QuantilesTDigestWeighted("quantilesTDigestWeighted", false),
    QuantilesTiming("quantilesTiming", false),
    QuantilesTimingWeighted("quantilesTimingWeighted", false),
    Rank("rank", true),
    RankCorr("rankCorr", false),
    Retention("retention", false),
    RowNumber("row_number", true),
    SequenceCount("sequenceCount", false),
    SequenceMatch("sequenceMatch", false),
    SequenceNextNode("sequenceNextNode", false),
    SimpleLinearRegression("simpleLinearRegression", false),
    SingleValueOrNull("singleValueOrNull", false),
    SkewPop("skewPop", false),
    SkewSamp("skewSamp", false),
    Sparkbar("sparkbar", false),
    StddevPop("stddevPop", false, "STDDEV_POP"),
    StddevPopStable("stddevPopStable", false),
    StddevSamp("stddevSamp", false, "STDDEV_SAMP"),
    StddevSampStable("stddevSampStable", false),
    StochasticLinearRegression("stochasticLinearRegression", false),
    StochasticLogisticRegression("stochasticLogisticRegression", false),
    StudentTTest("studentTTest", false),
    Sum("sum", true),
    SumCount("sumCount", false),
    SumKahan("sumKahan", false),
    SumMapFiltered("sumMapFiltered", false),
    SumMapFilteredWithOverflow("sumMapFilteredWithOverflow", false),
    SumMapWithOverflow("sumMapWithOverflow", false),
    SumMappedArrays("sumMappedArrays", false),
    SumWithOverflow("sumWithOverflow", false),
    TopK("topK", false),
    TopKWeighted("topKWeighted", false),
    Uniq("uniq", false),
    UniqCombined("uniqCombined", false),
    UniqCombined64("uniqCombined64", false),
    UniqExact("uniqExact", false),
    UniqHLL12("uniqHLL12", false),
    UniqTheta("uniqTheta", false),
    UniqUpTo("uniqUpTo", false),
    VarPop("varPop", false, "VAR_POP"),
    VarPopStable("varPopStable", false),
    VarSamp("varSamp", false, "VAR_SAMP"),
    VarSampStable("varSampStable", false),
    WelchTTest("welchTTest", false),
    WindowFunnel("windowFunnel", false),
}

fn catalog() -> &'static NameCatalog<AggregateFunction> {
    static CATALOG: OnceLock<NameCatalog<AggregateFunction>> = OnceLock::new();
    CATALOG.get_or_init(|| {
        NameCatalog::build(AggregateFunction::ALL.iter().map(|&f| Entry {
            name: f.name(),
            case_sensitive: f.is_case_sensitive(),
            aliases: f.aliases(),
            value: f,
        }))
        .unwrap_or_else(|e| panic!("aggregate function catalog: {e}"))
    })
}

impl AggregateFunction {
    /// Resolves a function name or alias, such as `uniqExact` or `median`.
    pub fn of(name: &str) -> Result<AggregateFunction> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(Error::parse(name, 0, "Non-empty function name is required"));
        }
        catalog().lookup(trimmed).ok_or_else(|| {
            Error::parse(name, 0, format!("Unknown aggregate function: {trimmed}"))
        })
    }

    pub(crate) fn lookup(name: &str) -> Option<AggregateFunction> {
        let trimmed = name.trim();
        (!trimmed.is_empty()).then(|| catalog().lookup(trimmed)).flatten()
    }
}

impl FromStr for AggregateFunction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        AggregateFunction::of(s)
    }
}

impl std::fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
