/// Named request parameters.
///
/// Entries keep insertion order, which is also the serialization order of
/// [`FormEncoder`]. Inserting an existing name replaces its value in place.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestParams {
    entries: Vec<(String, String)>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a parameter.
    pub fn insert(&mut self, name: impl Into<String>, value: impl ToString) {
        let name = name.into();
        let value = value.to_string();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Builder form of [`RequestParams::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.entries.iter().position(|(key, _)| key == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for RequestParams
where
    K: Into<String>,
    V: ToString,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for RequestParams
where
    K: Into<String>,
    V: ToString,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<()> for RequestParams {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

/// Serializes [`RequestParams`] into a query or form-encoded body string.
pub trait ParamsEncoder: Send + Sync {
    /// Must be deterministic for identical input.
    fn encode(&self, params: &RequestParams) -> String;
}

impl<F> ParamsEncoder for F
where
    F: Fn(&RequestParams) -> String + Send + Sync,
{
    fn encode(&self, params: &RequestParams) -> String {
        self(params)
    }
}

/// `name=value` pairs joined by `&`, percent-encoded, in insertion order.
#[derive(Clone, Copy, Debug, Default)]
pub struct FormEncoder;

impl ParamsEncoder for FormEncoder {
    fn encode(&self, params: &RequestParams) -> String {
        params
            .iter()
            .map(|(name, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(name),
                    urlencoding::encode(value)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}
