//! Helper methods for extracting data from search results.
use ldap3::SearchEntry;

/// An extension trait for [`SearchEntry`] that provides convenience methods for
/// extracting data.
pub trait SearchEntryExt {
	/// Get the first value of an attribute. Will return `None` if attribute
	/// value is not valid UTF-8.
	fn attr_first(&self, attr: &str) -> Option<&str>;

	/// Get the first value of an attribute, interpreted as a floating point
	/// number. Returns `None` both when the attribute is missing and when its
	/// value is not numeric.
	fn numeric_first(&self, attr: &str) -> Option<f64> {
		self.attr_first(attr)?.parse().ok()
	}

	/// Every attribute whose first value is numeric, along with that value.
	/// Attributes holding text are left out.
	fn numeric_attrs(&self) -> Vec<(&str, f64)>;
}

impl SearchEntryExt for SearchEntry {
	fn attr_first(&self, attr: &str) -> Option<&str> {
		let attr = self.attrs.get(attr)?;
		attr.first().map(String::as_str)
	}

	fn numeric_attrs(&self) -> Vec<(&str, f64)> {
		self.attrs
			.iter()
			.filter_map(|(name, values)| {
				let value = values.first()?.parse().ok()?;
				Some((name.as_str(), value))
			})
			.collect()
	}
}
