use crate::domain::SummaryStat;
use crate::registry::AttributeTypeMeta;
use crate::taxon::{AttrValue, Attribute, KeywordValue};

/// Result of summarizing one attribute: the canonical value that landed in
/// `<type>_value`, plus the value(s) to push into the parent accumulator.
#[derive(Debug, Clone, PartialEq)]
pub struct Summarized {
    pub canonical: AttrValue,
    pub propagate: Vec<AttrValue>,
}

/// Recompute an attribute's summary fields from its raw observations plus any
/// `extra` values pushed up from already-processed descendants. Returns `None`
/// when there is nothing to summarize, in which case the attribute is left
/// untouched and the caller must not write it.
pub fn summarize(
    attribute: &mut Attribute,
    meta: &AttributeTypeMeta,
    extra: &[AttrValue],
) -> Option<Summarized> {
    let mut pool = attribute.raw_values();
    pool.extend(extra.iter().cloned());

    if meta.value_type.is_numeric() {
        let numbers: Vec<f64> = pool.iter().filter_map(AttrValue::as_f64).collect();
        if numbers.is_empty() {
            return None;
        }
        attribute.clear_summary();
        attribute.count = Some(numbers.len() as u64);
        for stat in &meta.summary {
            apply_numeric_stat(attribute, *stat, &numbers);
        }
        let canonical_stat = meta.canonical_stat();
        let canonical = numeric_stat(canonical_stat, &numbers);
        attribute.set_canonical(meta.value_type, &canonical);
        attribute.aggregation_method = Some(canonical_stat.to_string());
        let propagate = vec![numeric_stat(meta.propagation_stat(), &numbers)];
        Some(Summarized {
            canonical,
            propagate,
        })
    } else {
        let keywords: Vec<String> = pool
            .iter()
            .filter_map(|value| value.as_keyword().map(str::to_string))
            .collect();
        if keywords.is_empty() {
            return None;
        }
        attribute.clear_summary();
        attribute.count = Some(keywords.len() as u64);
        for stat in &meta.summary {
            apply_keyword_stat(attribute, *stat, &keywords);
        }
        let canonical_stat = meta.canonical_stat();
        let canonical = keyword_canonical(attribute, canonical_stat, &keywords);
        attribute.aggregation_method = Some(canonical_stat.to_string());
        let propagate = keyword_propagation(meta.propagation_stat(), &keywords);
        Some(Summarized {
            canonical,
            propagate,
        })
    }
}

fn apply_numeric_stat(attribute: &mut Attribute, stat: SummaryStat, numbers: &[f64]) {
    match stat {
        SummaryStat::Count => {}
        SummaryStat::Min => attribute.min = Some(min(numbers)),
        SummaryStat::Max => attribute.max = Some(max(numbers)),
        SummaryStat::Mean => attribute.mean = Some(mean(numbers)),
        SummaryStat::Median => attribute.median = Some(median(numbers)),
        SummaryStat::MedianHigh => attribute.median_high = Some(median_high(numbers)),
        SummaryStat::MedianLow => attribute.median_low = Some(median_low(numbers)),
        SummaryStat::Mode => attribute.mode = Some(AttrValue::Double(mode(numbers))),
        // list is rejected for numeric types at registry load
        SummaryStat::List => {}
    }
}

fn numeric_stat(stat: SummaryStat, numbers: &[f64]) -> AttrValue {
    let value = match stat {
        SummaryStat::Count => numbers.len() as f64,
        SummaryStat::Min => min(numbers),
        SummaryStat::Max => max(numbers),
        SummaryStat::Mean => mean(numbers),
        SummaryStat::Median => median(numbers),
        SummaryStat::MedianHigh => median_high(numbers),
        SummaryStat::MedianLow => median_low(numbers),
        SummaryStat::Mode => mode(numbers),
        // unreachable: list is rejected for numeric types at registry load
        SummaryStat::List => f64::NAN,
    };
    AttrValue::Double(value)
}

fn apply_keyword_stat(attribute: &mut Attribute, stat: SummaryStat, keywords: &[String]) {
    match stat {
        SummaryStat::Mode => attribute.most_common = Some(most_common(keywords)),
        SummaryStat::List => {
            attribute.keyword_value = Some(KeywordValue::Many(distinct(keywords)));
        }
        _ => {}
    }
}

fn keyword_canonical(
    attribute: &mut Attribute,
    stat: SummaryStat,
    keywords: &[String],
) -> AttrValue {
    match stat {
        SummaryStat::List => {
            // canonical list already landed in keyword_value via apply_keyword_stat
            AttrValue::Keyword(distinct(keywords).join(","))
        }
        _ => {
            let keyword = most_common(keywords);
            attribute.keyword_value = Some(KeywordValue::One(keyword.clone()));
            AttrValue::Keyword(keyword)
        }
    }
}

fn keyword_propagation(stat: SummaryStat, keywords: &[String]) -> Vec<AttrValue> {
    match stat {
        SummaryStat::List => distinct(keywords).into_iter().map(AttrValue::Keyword).collect(),
        _ => vec![AttrValue::Keyword(most_common(keywords))],
    }
}

fn min(numbers: &[f64]) -> f64 {
    numbers.iter().copied().fold(f64::INFINITY, f64::min)
}

fn max(numbers: &[f64]) -> f64 {
    numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn mean(numbers: &[f64]) -> f64 {
    numbers.iter().sum::<f64>() / numbers.len() as f64
}

fn sorted(numbers: &[f64]) -> Vec<f64> {
    let mut copy = numbers.to_vec();
    copy.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    copy
}

fn median(numbers: &[f64]) -> f64 {
    let copy = sorted(numbers);
    let mid = copy.len() / 2;
    if copy.len() % 2 == 1 {
        copy[mid]
    } else {
        (copy[mid - 1] + copy[mid]) / 2.0
    }
}

fn median_high(numbers: &[f64]) -> f64 {
    let copy = sorted(numbers);
    copy[copy.len() / 2]
}

fn median_low(numbers: &[f64]) -> f64 {
    let copy = sorted(numbers);
    let mid = copy.len() / 2;
    if copy.len() % 2 == 1 {
        copy[mid]
    } else {
        copy[mid - 1]
    }
}

/// First-encountered value among those tied for highest frequency. Ties must
/// keep the earliest entry, so only a strictly greater count replaces the
/// running best.
fn mode(numbers: &[f64]) -> f64 {
    let mut seen: Vec<(f64, usize)> = Vec::new();
    for number in numbers {
        match seen.iter_mut().find(|(value, _)| value == number) {
            Some((_, count)) => *count += 1,
            None => seen.push((*number, 1)),
        }
    }
    let mut best = (f64::NAN, 0);
    for (value, count) in seen {
        if count > best.1 {
            best = (value, count);
        }
    }
    best.0
}

fn most_common(keywords: &[String]) -> String {
    let mut seen: Vec<(&str, usize)> = Vec::new();
    for keyword in keywords {
        match seen.iter_mut().find(|(value, _)| *value == keyword) {
            Some((_, count)) => *count += 1,
            None => seen.push((keyword, 1)),
        }
    }
    let mut best = ("", 0);
    for (value, count) in seen {
        if count > best.1 {
            best = (value, count);
        }
    }
    best.0.to_string()
}

/// De-duplicate preserving first-occurrence order.
fn distinct(keywords: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for keyword in keywords {
        if !out.contains(keyword) {
            out.push(keyword.clone());
        }
    }
    out
}
