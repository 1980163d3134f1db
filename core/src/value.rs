use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;

/// A value that can live in a scratchpad.
///
/// Implemented for every `Serialize + Send + Sync + 'static` type. The
/// `Serialize` bound is what makes a value inspectable: mutation checking
/// and trace recording compare and record values through [`snapshot`].
///
/// [`snapshot`]: ScratchValue::snapshot
pub trait ScratchValue: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Structural copy of the value, walked through collections and fields.
    fn snapshot(&self) -> Value;

    fn type_name(&self) -> &'static str;
}

impl<T> ScratchValue for T
where
    T: Serialize + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn snapshot(&self) -> Value {
        serde_json::to_value(self)
            .unwrap_or_else(|err| Value::String(format!("<unserializable: {err}>")))
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A type-erased scratchpad value.
pub type StoredValue = Arc<dyn ScratchValue>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Serialize)]
    struct Basket {
        owner: String,
        items: Mutex<Vec<String>>,
    }

    #[test]
    fn test_snapshot_walks_nested_values() {
        let basket = Basket {
            owner: "Fred".into(),
            items: Mutex::new(vec!["apple".into()]),
        };
        let before = basket.snapshot();
        assert_eq!(before, json!({"owner": "Fred", "items": ["apple"]}));

        basket.items.lock().unwrap().push("pear".into());
        assert_ne!(before, basket.snapshot());
    }

    #[test]
    fn test_downcast_through_as_any() {
        let stored: StoredValue = Arc::new(26.0_f64);
        assert_eq!((*stored).as_any().downcast_ref::<f64>(), Some(&26.0));
        assert!((*stored).as_any().downcast_ref::<String>().is_none());
    }
}
