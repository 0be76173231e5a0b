//! Command-line filter syntax.
//!
//! `field=value` compares for equality, `field=a,b` tests membership, and
//! `field>value` / `field<value` compare strictly. Operands are typed as
//! integer, float, boolean or text, in that order.

use xqdata::{Filter, FilterValue};

/// Parse one `--filter` argument.
pub(crate) fn parse_filter(raw: &str) -> Result<Filter, String> {
    let pos = raw
        .find(['=', '>', '<'])
        .ok_or_else(|| format!("filter `{raw}` needs one of `=`, `>` or `<`"))?;
    let (field, rest) = raw.split_at(pos);
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("filter `{raw}` has no field name"));
    }
    let operand = rest[1..].trim();

    Ok(match &rest[..1] {
        ">" => Filter::gt(field, typed_value(operand)),
        "<" => Filter::lt(field, typed_value(operand)),
        _ if operand.contains(',') => {
            Filter::isin(field, operand.split(',').map(|v| typed_value(v.trim())).collect())
        }
        _ => Filter::eq(field, typed_value(operand)),
    })
}

fn typed_value(raw: &str) -> FilterValue {
    if let Ok(v) = raw.parse::<i64>() {
        FilterValue::Int(v)
    } else if let Ok(v) = raw.parse::<f64>() {
        FilterValue::Float(v)
    } else if let Ok(v) = raw.parse::<bool>() {
        FilterValue::Bool(v)
    } else {
        FilterValue::Str(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use xqdata::Comparator;

    #[rstest]
    #[case("exchange=XSHE", Comparator::Eq, FilterValue::Str("XSHE".into()))]
    #[case("lot=100", Comparator::Eq, FilterValue::Int(100))]
    #[case("price>9.5", Comparator::Gt, FilterValue::Float(9.5))]
    #[case("listed<false", Comparator::Lt, FilterValue::Bool(false))]
    fn test_scalar_filters(
        #[case] raw: &str,
        #[case] comparator: Comparator,
        #[case] value: FilterValue,
    ) {
        let filter = parse_filter(raw).unwrap();
        assert_eq!(filter.comparator, comparator);
        assert_eq!(filter.value, value);
    }

    #[test]
    fn test_list_filter() {
        let filter = parse_filter("code = 000001.XSHE, 600000.XSHG").unwrap();
        assert_eq!(filter.field, "code");
        assert_eq!(filter.comparator, Comparator::IsIn);
        assert_eq!(
            filter.value,
            FilterValue::List(vec![
                FilterValue::Str("000001.XSHE".into()),
                FilterValue::Str("600000.XSHG".into()),
            ])
        );
    }

    #[rstest]
    #[case("exchange")]
    #[case("=XSHE")]
    fn test_malformed(#[case] raw: &str) {
        assert!(parse_filter(raw).is_err());
    }
}
