use super::*;

fn sorted(mut names: Vec<&str>) -> Vec<&str> {
    names.sort_by(|a, b| natural_cmp(a, b));
    names
}

#[test]
fn test_numeric_prefixes_sort_numerically() {
    assert_eq!(
        sorted(vec!["10_x.sql", "2_x.sql", "1_x.sql"]),
        vec!["1_x.sql", "2_x.sql", "10_x.sql"]
    );
}

#[test]
fn test_jalla_before_other() {
    assert_eq!(
        sorted(vec!["2_other.sql", "1_jalla.sql"]),
        vec!["1_jalla.sql", "2_other.sql"]
    );
}

#[test]
fn test_leading_zeros_compare_by_value() {
    assert_eq!(natural_cmp("0002_a.sql", "10_a.sql"), Ordering::Less);
    // Equal value, raw string breaks the tie so the order stays total
    assert_ne!(natural_cmp("01_a.sql", "1_a.sql"), Ordering::Equal);
}

#[test]
fn test_huge_numbers_do_not_overflow() {
    assert_eq!(
        natural_cmp(
            "20240101120000123456789_a.sql",
            "20240101120000123456790_a.sql"
        ),
        Ordering::Less
    );
}

#[test]
fn test_text_is_case_insensitive() {
    assert_eq!(natural_cmp("b.sql", "A.sql"), Ordering::Greater);
    assert_eq!(natural_cmp("a.sql", "B.sql"), Ordering::Less);
}

#[test]
fn test_nested_paths_sort_with_top_level() {
    assert_eq!(
        sorted(vec![
            "up/sub/3_c.sql",
            "up/10_d.sql",
            "up/2_b.sql",
            "up/1_a.sql"
        ]),
        vec!["up/1_a.sql", "up/2_b.sql", "up/10_d.sql", "up/sub/3_c.sql"]
    );
}

#[test]
fn test_prefix_sorts_first() {
    assert_eq!(natural_cmp("a", "ab"), Ordering::Less);
    assert_eq!(natural_cmp("", "a"), Ordering::Less);
    assert_eq!(natural_cmp("same", "same"), Ordering::Equal);
}
