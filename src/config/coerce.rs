use std::sync::LazyLock;

use regex::Regex;

use super::value::{ParamMap, ParamValue};

// Nonnegative float literals: "10", "0.5", ".3"
static RE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d*\.*\d+").expect("valid number regex"));
static RE_BRACKET_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([A-Za-z0-9_,.]+)\]").expect("valid bracket group regex"));
static RE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9_]+").expect("valid token regex"));
static RE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z]+").expect("valid word regex"));

const NULL_TOKEN: &str = "None";

/// Declared semantic type of a configuration key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Integer count or null (`max_threads`, `number_of_stacks`)
    IntOrNull,
    /// Single float (`input_voxel_size`)
    Scalar,
    /// Scalar count or a `[low, high)` range
    Count,
    /// List of floats with an optional trailing null sentinel
    FloatList,
    Bool,
    /// List of resize profiles
    NestedList,
    /// Ordered list of names
    Tokens,
    /// One boolean per combination
    FlagList,
}

/// Look up the declared kind of a configuration key.
///
/// Keys not listed here (folder names, file names, the cell kind) are kept as
/// raw strings.
pub fn param_kind(key: &str) -> Option<ParamKind> {
    let kind = match key {
        "max_threads" | "number_of_stacks" => ParamKind::IntOrNull,
        "input_voxel_size" => ParamKind::Scalar,
        "number_of_cells" => ParamKind::Count,
        "size_mean_and_std"
        | "spikiness_range"
        | "spike_size_range"
        | "spike_smoothness_range"
        | "stack_size_microns"
        | "psf_sigmas"
        | "psf_aspect_ratios"
        | "snr"
        | "deconvolution_lab_rltv_iterations"
        | "iterative_deconvolve_3d_low"
        | "deconvolution_lab_rif_regularization_lambda"
        | "deconvolution_lab_rltv_regularization_lambda"
        | "iterative_deconvolve_3d_terminate"
        | "iterative_deconvolve_3d_wiener" => ParamKind::FloatList,
        "print_progress"
        | "equal_dimensions"
        | "log_computing_time"
        | "test_snr_combinations"
        | "coordinates" => ParamKind::Bool,
        "voxel_sizes_for_resizing" => ParamKind::NestedList,
        "deconvolution_algorithm" | "noise_kind" | "simulation_steps" => ParamKind::Tokens,
        "iterative_deconvolve_3d_detect"
        | "iterative_deconvolve_3d_perform"
        | "iterative_deconvolve_3d_normalize" => ParamKind::FlagList,
        _ => return None,
    };
    Some(kind)
}

/// Coerce every recognized key of a raw configuration into its declared kind.
///
/// Unknown keys pass through untouched. Nothing is validated here: a value
/// that yields no numeric literal becomes an empty list.
pub fn coerce_params(raw: ParamMap) -> ParamMap {
    raw.into_iter()
        .map(|(key, value)| {
            let value = match param_kind(&key) {
                Some(kind) => coerce_value(kind, value),
                None => value,
            };
            (key, value)
        })
        .collect()
}

/// Coerce a single value into the given kind
pub fn coerce_value(kind: ParamKind, value: ParamValue) -> ParamValue {
    match kind {
        ParamKind::IntOrNull => coerce_int_or_null(value),
        ParamKind::Scalar => coerce_scalar(value),
        ParamKind::Count => coerce_count(value),
        ParamKind::FloatList => coerce_float_list(value),
        ParamKind::Bool => ParamValue::Bool(parse_bool(&value.to_string())),
        ParamKind::NestedList => coerce_nested_list(value),
        ParamKind::Tokens => coerce_tokens(value),
        ParamKind::FlagList => ParamValue::Flags(parse_flags(&value.to_string())),
    }
}

fn coerce_int_or_null(value: ParamValue) -> ParamValue {
    match value {
        ParamValue::Text(s) => {
            let trimmed = s.trim();
            if trimmed == NULL_TOKEN || trimmed.is_empty() {
                return ParamValue::Null;
            }
            extract_numbers(trimmed)
                .first()
                .map_or(ParamValue::Null, |n| ParamValue::Number(*n))
        }
        ParamValue::Numbers(values) => values
            .into_iter()
            .flatten()
            .next()
            .map_or(ParamValue::Null, ParamValue::Number),
        other => other,
    }
}

fn coerce_scalar(value: ParamValue) -> ParamValue {
    match value {
        ParamValue::Text(s) => match extract_numbers(&s).first() {
            Some(n) => ParamValue::Number(*n),
            None => ParamValue::Numbers(vec![]),
        },
        ParamValue::Numbers(values) => match values.iter().flatten().next() {
            Some(n) => ParamValue::Number(*n),
            None => ParamValue::Numbers(vec![]),
        },
        other => other,
    }
}

fn coerce_count(value: ParamValue) -> ParamValue {
    let numbers = match value {
        ParamValue::Text(s) => extract_numbers(&s),
        ParamValue::Numbers(values) => values.into_iter().flatten().collect(),
        other => return other,
    };
    match numbers.as_slice() {
        [single] => ParamValue::Number(*single),
        _ => ParamValue::numbers(&numbers),
    }
}

fn coerce_float_list(value: ParamValue) -> ParamValue {
    match value {
        ParamValue::Text(s) => {
            let mut values: Vec<Option<f64>> =
                extract_numbers(&s).into_iter().map(Some).collect();
            if s.contains(NULL_TOKEN) {
                values.push(None);
            }
            ParamValue::Numbers(values)
        }
        ParamValue::Number(n) => ParamValue::Numbers(vec![Some(n)]),
        ParamValue::Null => ParamValue::Numbers(vec![None]),
        other => other,
    }
}

fn coerce_nested_list(value: ParamValue) -> ParamValue {
    match value {
        ParamValue::Text(s) => ParamValue::NumberLists(parse_resize_profiles(&s)),
        ParamValue::Number(n) => ParamValue::NumberLists(vec![vec![n]]),
        ParamValue::Numbers(values) => {
            ParamValue::NumberLists(vec![values.into_iter().flatten().collect()])
        }
        other => other,
    }
}

fn coerce_tokens(value: ParamValue) -> ParamValue {
    match value {
        ParamValue::Text(s) => ParamValue::Texts(
            RE_TOKEN
                .find_iter(&s)
                .map(|m| m.as_str().to_string())
                .collect(),
        ),
        other => other,
    }
}

/// Extract every nonnegative float literal in order of appearance
pub fn extract_numbers(s: &str) -> Vec<f64> {
    RE_NUMBER
        .find_iter(s)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect()
}

/// Only the case-insensitive token `FALSE` is false
pub fn parse_bool(s: &str) -> bool {
    !s.eq_ignore_ascii_case("FALSE")
}

/// Map each alphabetic run to a flag: `TRUE` is true, any other word false
pub fn parse_flags(s: &str) -> Vec<bool> {
    RE_WORD
        .find_iter(s)
        .map(|m| m.as_str().eq_ignore_ascii_case("TRUE"))
        .collect()
}

/// Parse resize profiles from a string such as `"[1,0.5,0.5][2,1,1]3"`.
///
/// Bracketed groups are taken first and removed from the string; every bare
/// literal left afterwards becomes its own one-element profile, rounded to
/// 7 decimal digits.
pub fn parse_resize_profiles(s: &str) -> Vec<Vec<f64>> {
    let mut remaining: String = s.chars().filter(|c| *c != ' ').collect();
    let groups: Vec<String> = RE_BRACKET_GROUP
        .captures_iter(&remaining)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect();

    let mut profiles = Vec::with_capacity(groups.len());
    for group in groups {
        profiles.push(extract_numbers(&group));
        remaining = remaining.replace(&format!("[{}]", group), "");
    }

    for n in extract_numbers(&remaining) {
        profiles.push(vec![round_to(n, 7)]);
    }

    profiles
}

fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coerce_text(key: &str, raw: &str) -> ParamValue {
        let kind = param_kind(key).unwrap();
        coerce_value(kind, ParamValue::text(raw))
    }

    #[test]
    fn test_flag_list_keeps_order() {
        for key in [
            "iterative_deconvolve_3d_detect",
            "iterative_deconvolve_3d_perform",
            "iterative_deconvolve_3d_normalize",
        ] {
            assert_eq!(
                coerce_text(key, "True False true"),
                ParamValue::Flags(vec![true, false, true])
            );
        }
    }

    #[test]
    fn test_only_false_token_is_false() {
        assert!(!parse_bool("FALSE"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("False"));
        assert!(parse_bool(""));
        assert!(parse_bool("no"));
        assert!(parse_bool("0"));
        assert!(parse_bool("True"));
        assert_eq!(
            coerce_value(ParamKind::Bool, ParamValue::Bool(false)),
            ParamValue::Bool(false)
        );
        assert_eq!(
            coerce_value(ParamKind::Bool, ParamValue::Null),
            ParamValue::Bool(true)
        );
    }

    #[test]
    fn test_resize_profiles_order() {
        assert_eq!(
            parse_resize_profiles("[1,0.5,0.5][2,1,1]3"),
            vec![vec![1.0, 0.5, 0.5], vec![2.0, 1.0, 1.0], vec![3.0]]
        );
        assert_eq!(
            parse_resize_profiles("[[1, 0.5, 0.5], [2]]"),
            vec![vec![1.0, 0.5, 0.5], vec![2.0]]
        );
        assert!(parse_resize_profiles("").is_empty());
    }

    #[test]
    fn test_int_or_null() {
        assert_eq!(coerce_text("number_of_stacks", "None"), ParamValue::Null);
        assert_eq!(coerce_text("number_of_stacks", ""), ParamValue::Null);
        assert_eq!(coerce_text("max_threads", "4"), ParamValue::Number(4.0));
        assert_eq!(coerce_text("max_threads", "4.0"), ParamValue::Number(4.0));
    }

    #[test]
    fn test_scalar_ignores_trailing_text() {
        assert_eq!(
            coerce_text("input_voxel_size", "0.3 um"),
            ParamValue::Number(0.3)
        );
        assert_eq!(
            coerce_text("input_voxel_size", "[0.3, 1]"),
            ParamValue::Number(0.3)
        );
        assert_eq!(
            coerce_text("input_voxel_size", "n/a"),
            ParamValue::Numbers(vec![])
        );
    }

    #[test]
    fn test_count_scalar_or_range() {
        assert_eq!(coerce_text("number_of_cells", "2"), ParamValue::Number(2.0));
        assert_eq!(
            coerce_text("number_of_cells", "[3, 6]"),
            ParamValue::numbers(&[3.0, 6.0])
        );
        assert_eq!(
            coerce_text("number_of_cells", "many"),
            ParamValue::Numbers(vec![])
        );
    }

    #[test]
    fn test_float_list_with_null_sentinel() {
        assert_eq!(
            coerce_text("snr", "[None, 5]"),
            ParamValue::Numbers(vec![Some(5.0), None])
        );
        assert_eq!(
            coerce_text("psf_sigmas", "[0.1 0.5]"),
            ParamValue::numbers(&[0.1, 0.5])
        );
        assert_eq!(
            coerce_text("size_mean_and_std", "(10, 2)"),
            ParamValue::numbers(&[10.0, 2.0])
        );
        assert_eq!(coerce_text("snr", "none at all"), ParamValue::Numbers(vec![]));
        assert_eq!(
            coerce_value(ParamKind::FloatList, ParamValue::Number(0.001)),
            ParamValue::numbers(&[0.001])
        );
    }

    #[test]
    fn test_tokens_drop_brackets_and_quotes() {
        assert_eq!(
            coerce_text(
                "deconvolution_algorithm",
                "['deconvolution_lab_rif', 'deconvolution_lab_rltv']"
            ),
            ParamValue::texts(&["deconvolution_lab_rif", "deconvolution_lab_rltv"])
        );
        assert_eq!(
            coerce_text("simulation_steps", "generate_cells,convolve"),
            ParamValue::texts(&["generate_cells", "convolve"])
        );
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let mut raw = ParamMap::new();
        raw.insert("my_extension".to_string(), ParamValue::text("[1, 2]"));
        raw.insert("snr".to_string(), ParamValue::text("5"));
        let coerced = coerce_params(raw);
        assert_eq!(coerced["my_extension"], ParamValue::text("[1, 2]"));
        assert_eq!(coerced["snr"], ParamValue::numbers(&[5.0]));
    }

    #[test]
    fn test_display_round_trips_through_coercion() {
        let values = [
            ("snr", ParamValue::Numbers(vec![Some(5.0), None])),
            (
                "voxel_sizes_for_resizing",
                ParamValue::NumberLists(vec![vec![1.0, 0.5, 0.5], vec![2.0]]),
            ),
            ("noise_kind", ParamValue::texts(&["poisson", "gaussian"])),
            (
                "iterative_deconvolve_3d_detect",
                ParamValue::Flags(vec![false, true]),
            ),
            ("number_of_stacks", ParamValue::Null),
            ("print_progress", ParamValue::Bool(false)),
        ];
        for (key, value) in values {
            let raw = ParamValue::text(value.to_string());
            assert_eq!(coerce_value(param_kind(key).unwrap(), raw), value, "{}", key);
        }
    }
}
