/// True when at most one of `values` is `Some`. Used to validate mutually
/// exclusive arguments.
pub fn check_maximum_one_value_not_none<T, I>(values: I) -> bool
where
    I: IntoIterator<Item = Option<T>>,
{
    values.into_iter().filter(Option::is_some).take(2).count() <= 1
}
