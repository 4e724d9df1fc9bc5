/// Ordered hits of one gesture; `None` marks a discontinuity.
///
/// Pushing a hit equal to the last one, or a marker right after a marker,
/// leaves the list unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitList<H> {
	hits: Vec<Option<H>>,
}

impl<H> Default for HitList<H> {
	fn default() -> Self {
		Self { hits: Vec::new() }
	}
}

impl<H: PartialEq> HitList<H> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends `hit` unless it coalesces with the last entry. Returns true if appended.
	pub fn push(&mut self, hit: Option<H>) -> bool {
		if self.hits.last() == Some(&hit) {
			return false;
		}
		self.hits.push(hit);
		true
	}

	/// Empties the list and, if `hit` is present, starts it with that hit.
	///
	/// A gesture never starts on a discontinuity.
	pub fn restart(&mut self, hit: Option<H>) {
		self.hits.clear();
		if let Some(hit) = hit {
			self.hits.push(Some(hit));
		}
	}

	pub fn clear(&mut self) {
		self.hits.clear();
	}

	pub fn as_slice(&self) -> &[Option<H>] {
		&self.hits
	}

	pub fn len(&self) -> usize {
		self.hits.len()
	}

	pub fn is_empty(&self) -> bool {
		self.hits.is_empty()
	}

	/// True when the list is exactly the single hit `hit`.
	pub fn is_only(&self, hit: &H) -> bool {
		matches!(self.hits.as_slice(), [Some(only)] if only == hit)
	}

	/// Both ends, when the list has at least two entries and neither end is a marker.
	pub fn ends(&self) -> Option<(&H, &H)> {
		if self.hits.len() < 2 {
			return None;
		}
		match (self.hits.first(), self.hits.last()) {
			(Some(Some(first)), Some(Some(last))) => Some((first, last)),
			_ => None,
		}
	}

	/// The hit, when the list is exactly one hit.
	pub fn single(&self) -> Option<&H> {
		match self.hits.as_slice() {
			[Some(only)] => Some(only),
			_ => None,
		}
	}
}

impl<H: PartialEq> Extend<Option<H>> for HitList<H> {
	fn extend<I: IntoIterator<Item = Option<H>>>(&mut self, iter: I) {
		for hit in iter {
			self.push(hit);
		}
	}
}
