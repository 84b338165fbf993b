// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Argument lists and subset projection.
//!
//! A channel's argument list is a tuple (`()`, `(T,)`, `(T, U)`, ... up to
//! twelve elements). [`ArgList`] gives each tuple a runtime shape so views and
//! joins can build an index mapping once at subscribe time and reuse it on
//! every call.

use std::any::{Any, TypeId};
use std::fmt::Debug;

/// Bound every argument type satisfies: owned, cloneable, and printable for
/// channel debug traces.
pub trait Arg: Any + Clone + Debug {}

impl<T: Any + Clone + Debug> Arg for T {}

/// Tuple of [`Arg`] values carried by one channel call.
pub trait ArgList: Any + Clone + Debug {
    /// Number of elements.
    const ARITY: usize;

    /// `TypeId` of each element, in order.
    fn type_ids() -> Vec<TypeId>;

    /// Type name of each element, in order.
    fn type_names() -> Vec<&'static str>;

    /// Borrowed element `index` as `Any`, or `None` when out of range.
    fn part(&self, index: usize) -> Option<&dyn Any>;

    /// Moves every element into its own box.
    fn into_parts(self) -> Vec<Box<dyn Any>>;

    /// Rebuilds the tuple by cloning from borrowed parts. `None` when the
    /// count or any element type does not match.
    fn from_refs(parts: &[&dyn Any]) -> Option<Self>;

    /// Rebuilds the tuple from owned parts. `None` when the count or any
    /// element type does not match.
    fn from_boxes(parts: Vec<Box<dyn Any>>) -> Option<Self>;

    /// Comma-separated `Debug` rendering used by channel debug lines.
    fn render(&self) -> String;
}

macro_rules! impl_arg_list {
    ($arity:expr; $($T:ident . $idx:tt),*) => {
        impl<$($T: Arg),*> ArgList for ($($T,)*) {
            const ARITY: usize = $arity;

            fn type_ids() -> Vec<TypeId> {
                vec![$(TypeId::of::<$T>()),*]
            }

            fn type_names() -> Vec<&'static str> {
                vec![$(std::any::type_name::<$T>()),*]
            }

            #[allow(clippy::match_single_binding)]
            fn part(&self, index: usize) -> Option<&dyn Any> {
                match index {
                    $($idx => Some(&self.$idx as &dyn Any),)*
                    _ => None,
                }
            }

            fn into_parts(self) -> Vec<Box<dyn Any>> {
                vec![$(Box::new(self.$idx) as Box<dyn Any>),*]
            }

            #[allow(unused_mut)]
            fn from_refs(parts: &[&dyn Any]) -> Option<Self> {
                let mut iter = parts.iter();
                let out = ($(iter.next()?.downcast_ref::<$T>()?.clone(),)*);
                if iter.next().is_some() {
                    return None;
                }
                Some(out)
            }

            #[allow(unused_mut)]
            fn from_boxes(parts: Vec<Box<dyn Any>>) -> Option<Self> {
                let mut iter = parts.into_iter();
                let out = ($(*iter.next()?.downcast::<$T>().ok()?,)*);
                if iter.next().is_some() {
                    return None;
                }
                Some(out)
            }

            fn render(&self) -> String {
                let parts: Vec<String> = vec![$(format!("{:?}", self.$idx)),*];
                parts.join(", ")
            }
        }
    };
}

impl_arg_list!(0;);
impl_arg_list!(1; A.0);
impl_arg_list!(2; A.0, B.1);
impl_arg_list!(3; A.0, B.1, C.2);
impl_arg_list!(4; A.0, B.1, C.2, D.3);
impl_arg_list!(5; A.0, B.1, C.2, D.3, E.4);
impl_arg_list!(6; A.0, B.1, C.2, D.3, E.4, F.5);
impl_arg_list!(7; A.0, B.1, C.2, D.3, E.4, F.5, G.6);
impl_arg_list!(8; A.0, B.1, C.2, D.3, E.4, F.5, G.6, H.7);
impl_arg_list!(9; A.0, B.1, C.2, D.3, E.4, F.5, G.6, H.7, I.8);
impl_arg_list!(10; A.0, B.1, C.2, D.3, E.4, F.5, G.6, H.7, I.8, J.9);
impl_arg_list!(11; A.0, B.1, C.2, D.3, E.4, F.5, G.6, H.7, I.8, J.9, K.10);
impl_arg_list!(12; A.0, B.1, C.2, D.3, E.4, F.5, G.6, H.7, I.8, J.9, K.10, L.11);

/// Index mapping from a declared argument list onto an ordered subsequence.
///
/// Built by walking both type sequences in lockstep: a match consumes one
/// element from each side, a mismatch skips the declared element. Every
/// requested element must be consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    indices: Vec<usize>,
}

impl Projection {
    /// Computes the mapping, or `None` when `requested` is not an ordered
    /// subsequence of `declared`.
    pub fn between(declared: &[TypeId], requested: &[TypeId]) -> Option<Self> {
        let mut indices = Vec::with_capacity(requested.len());
        let mut want = requested.iter().peekable();
        for (index, ty) in declared.iter().enumerate() {
            match want.peek() {
                Some(next) if *next == ty => {
                    indices.push(index);
                    want.next();
                }
                Some(_) => {}
                None => break,
            }
        }
        if want.peek().is_some() {
            return None;
        }
        Some(Self { indices })
    }

    /// Mapping for the argument lists of two tuple types.
    pub fn of<A: ArgList, B: ArgList>() -> Option<Self> {
        Self::between(&A::type_ids(), &B::type_ids())
    }

    /// Declared positions kept by this projection, in order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// True when every declared argument is forwarded unchanged.
    pub fn is_identity(&self, declared_arity: usize) -> bool {
        self.indices.len() == declared_arity
    }

    /// Builds the projected tuple from a full argument list.
    pub fn apply<A: ArgList, B: ArgList>(&self, args: &A) -> Option<B> {
        let parts = self
            .indices
            .iter()
            .map(|index| args.part(*index))
            .collect::<Option<Vec<_>>>()?;
        B::from_refs(&parts)
    }
}

/// Human-readable `(T, U, ...)` rendering of an argument list's types.
pub fn describe<A: ArgList>() -> String {
    format!("({})", A::type_names().join(", "))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn projection_picks_ordered_subsequence() {
        let p = Projection::of::<(i32, f64, String), (i32, String)>().unwrap();
        assert_eq!(p.indices(), &[0, 2]);
        let out: (i32, String) = p.apply(&(7, 1.5, "x".to_owned())).unwrap();
        assert_eq!(out, (7, "x".to_owned()));
    }

    #[test]
    fn projection_skips_greedily_over_repeated_types() {
        let p = Projection::of::<(u8, u8, u16, u8), (u8, u8)>().unwrap();
        assert_eq!(p.indices(), &[0, 1]);
        let p = Projection::of::<(u8, u16, u8), (u16, u8)>().unwrap();
        assert_eq!(p.indices(), &[1, 2]);
    }

    #[test]
    fn projection_rejects_reordering_and_unknown_types() {
        assert!(Projection::of::<(i32, String), (String, i32)>().is_none());
        assert!(Projection::of::<(i32,), (i64,)>().is_none());
        assert!(Projection::of::<(i32,), (i32, i32)>().is_none());
    }

    #[test]
    fn empty_request_is_always_reachable() {
        let p = Projection::of::<(i32, String), ()>().unwrap();
        assert!(p.indices().is_empty());
        let out: () = p.apply(&(1, String::new())).unwrap();
        assert_eq!(out, ());
    }

    #[test]
    fn boxes_round_trip_through_parts() {
        let parts = (3u8, "a".to_owned()).into_parts();
        assert_eq!(
            <(u8, String)>::from_boxes(parts),
            Some((3u8, "a".to_owned()))
        );
        assert_eq!(<(u8,)>::from_boxes(vec![Box::new(1u16)]), None);
    }

    #[test]
    fn twelve_element_tuples_have_a_shape() {
        type Wide = (u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, String);
        assert_eq!(Wide::ARITY, 12);
        let wide: Wide = (0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, "z".to_owned());
        let p = Projection::of::<Wide, (u8, String)>().unwrap();
        assert_eq!(p.indices(), &[0, 11]);
        let out: (u8, String) = p.apply(&wide).unwrap();
        assert_eq!(out, (0, "z".to_owned()));
        assert_eq!(Wide::from_boxes(wide.clone().into_parts()), Some(wide));
    }

    #[test]
    fn render_joins_debug_forms() {
        assert_eq!((1, "x").render(), "1, \"x\"");
        assert_eq!(().render(), "");
        assert_eq!(describe::<(i32, bool)>(), "(i32, bool)");
    }
}
