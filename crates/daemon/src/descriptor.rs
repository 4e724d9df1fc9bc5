use std::any::{Any, TypeId};
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Immutable value naming what a daemon computes.
///
/// Two descriptors that compare equal name the same computation, so the
/// scheduler never runs two daemons of one type for equal descriptors.
pub trait Descriptor: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> Descriptor for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// Object-safe view of a [`Descriptor`] for the type-erased registry.
pub trait AnyDescriptor: Debug + Send + Sync {
	fn as_any(&self) -> &dyn Any;
	fn dyn_eq(&self, other: &dyn AnyDescriptor) -> bool;
	fn dyn_hash(&self, state: &mut dyn Hasher);
}

impl<T: Descriptor> AnyDescriptor for T {
	fn as_any(&self) -> &dyn Any {
		self
	}

	fn dyn_eq(&self, other: &dyn AnyDescriptor) -> bool {
		other.as_any().downcast_ref::<T>().is_some_and(|other| self == other)
	}

	fn dyn_hash(&self, mut state: &mut dyn Hasher) {
		self.hash(&mut state);
	}
}

/// Registry key: daemon type plus descriptor.
#[derive(Clone)]
pub(crate) struct DaemonKey {
	type_id: TypeId,
	type_name: &'static str,
	descriptor: Arc<dyn AnyDescriptor>,
}

impl DaemonKey {
	pub(crate) fn of<D: 'static>(descriptor: impl Descriptor) -> Self {
		Self {
			type_id: TypeId::of::<D>(),
			type_name: short_type_name(std::any::type_name::<D>()),
			descriptor: Arc::new(descriptor),
		}
	}

	pub(crate) fn type_name(&self) -> &'static str {
		self.type_name
	}

	pub(crate) fn descriptor(&self) -> &dyn AnyDescriptor {
		&*self.descriptor
	}
}

impl PartialEq for DaemonKey {
	fn eq(&self, other: &Self) -> bool {
		self.type_id == other.type_id && self.descriptor.dyn_eq(&*other.descriptor)
	}
}

impl Eq for DaemonKey {}

impl Hash for DaemonKey {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.type_id.hash(state);
		self.descriptor.dyn_hash(state);
	}
}

impl Debug for DaemonKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}({:?})", self.type_name, self.descriptor)
	}
}

/// Strips module paths, keeping generic arguments readable.
fn short_type_name(full: &'static str) -> &'static str {
	let head = full.split('<').next().unwrap_or(full);
	match head.rfind("::") {
		Some(pos) if full.len() == head.len() => &full[pos + 2..],
		_ => full,
	}
}
