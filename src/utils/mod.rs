//! Small helpers shared across modules.

use std::any::Any;

/// Downcasting access for trait objects built on top of [`Any`].
///
/// Call it on `&dyn Trait`, never on a `Box` or `Arc` holding one: the
/// blanket impl would otherwise resolve to the smart pointer itself.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Type name without module path or generic arguments:
/// `my_app::states::Tender<u8>` becomes `Tender`.
pub fn simple_type_name<T: ?Sized>() -> &'static str {
    simplify(std::any::type_name::<T>())
}

pub(crate) fn simplify(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
