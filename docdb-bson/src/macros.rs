/// Builds a [`Document`](crate::Document) from `"key": value` pairs.
///
/// Values go through [`Value::from`](crate::Value), so scalars, strings,
/// nested `doc!` invocations and `Vec<Value>` arrays all work:
///
/// ```
/// use docdb_bson::doc;
///
/// let d = doc! {
///     "name": "widget",
///     "count": 3,
///     "dims": doc! {"w": 2.5, "h": 1.0},
/// };
/// assert_eq!(d.get("dims").get("w").number(), 2.5);
/// ```
#[macro_export]
macro_rules! doc {
    () => { $crate::Document::new() };
    ($($key:tt : $value:expr),+ $(,)?) => {{
        let mut doc = $crate::Document::new();
        $( doc.insert($key, $crate::Value::from($value)); )+
        doc
    }};
}

/// Builds a `Value::Array` from a list of values.
///
/// ```
/// use docdb_bson::{array, doc};
///
/// let d = doc! {"tags": array!["a", "b", 3]};
/// assert_eq!(d.get("tags").elem(2).int32(), 3);
/// ```
#[macro_export]
macro_rules! array {
    () => { $crate::Value::Array(Vec::new()) };
    ($($value:expr),+ $(,)?) => {
        $crate::Value::Array(vec![ $( $crate::Value::from($value) ),+ ])
    };
}
