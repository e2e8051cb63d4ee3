use crate::error::{Error, Result};

use std::collections::BTreeMap;

/// A record of named ports, each carrying a `T`.
///
/// Implementations are generated by [`interface!`](crate::interface!); the same record type is used with `T = u32` as a table of port widths, with `T = &Signal` while building a graph, and with simulator cells while driving a simulation.
pub trait Interface<T>: Sized {
    /// Field names, in declaration order.
    const FIELDS: &'static [&'static str];

    /// Flattens this record into `(field name, value)` pairs, in declaration order.
    fn to_port_list(self) -> Vec<(String, T)>;

    /// Rebuilds a record from `(field name, value)` pairs in any order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldMismatch`] unless `ports` names every field exactly once.
    fn of_port_list(ports: Vec<(String, T)>) -> Result<Self>;
}

/// Name-indexed port values being assembled into an interface record.
#[doc(hidden)]
pub struct PortList<T> {
    fields: &'static [&'static str],
    ports: BTreeMap<String, T>,
    found: Vec<String>,
}

impl<T> PortList<T> {
    pub fn new(fields: &'static [&'static str], ports: Vec<(String, T)>) -> Result<PortList<T>> {
        let found = ports.iter().map(|(name, _)| name.clone()).collect::<Vec<_>>();
        let count = ports.len();
        let ports = ports.into_iter().collect::<BTreeMap<_, _>>();
        let list = PortList {
            fields,
            ports,
            found,
        };
        if count != fields.len()
            || list.ports.len() != count
            || fields.iter().any(|field| !list.ports.contains_key(*field))
        {
            return Err(list.mismatch());
        }
        Ok(list)
    }

    pub fn take(&mut self, field: &str) -> Result<T> {
        self.ports.remove(field).ok_or_else(|| self.mismatch())
    }

    fn mismatch(&self) -> Error {
        Error::FieldMismatch {
            expected: self.fields.iter().map(|field| field.to_string()).collect(),
            found: self.found.clone(),
        }
    }
}

/// Declares an interface record: a struct generic over its field type, together with its [`Interface`](crate::Interface) implementation.
///
/// The generated `Name<T>` has one public field per port and a `map` method that converts every field at once.
///
/// # Examples
///
/// ```
/// use kiln::*;
///
/// interface! {
///     /// A valid/ready handshake.
///     pub struct Handshake {
///         valid,
///         ready,
///         data,
///     }
/// }
///
/// # fn main() -> kiln::Result<()> {
/// let widths = Handshake { valid: 1, ready: 1, data: 32 };
/// assert_eq!(Handshake::<u32>::FIELDS, &["valid", "ready", "data"]);
///
/// let doubled = widths.map(|w| w * 2);
/// assert_eq!(doubled.data, 64);
///
/// let ports = widths.to_port_list();
/// assert_eq!(ports[2], ("data".to_string(), 32));
/// assert_eq!(Handshake::of_port_list(ports)?, widths);
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! interface {
    (
        $(#[$attr:meta])*
        $vis:vis struct $name:ident {
            $($(#[$field_attr:meta])* $field:ident),* $(,)?
        }
    ) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, Eq, PartialEq)]
        $vis struct $name<T> {
            $($(#[$field_attr])* pub $field: T,)*
        }

        impl<T> $name<T> {
            /// Applies `f` to every field, in declaration order.
            #[allow(dead_code)]
            pub fn map<U, F: FnMut(T) -> U>(self, mut f: F) -> $name<U> {
                $name {
                    $($field: f(self.$field),)*
                }
            }
        }

        impl<T> $crate::Interface<T> for $name<T> {
            const FIELDS: &'static [&'static str] = &[$(stringify!($field)),*];

            fn to_port_list(self) -> Vec<(String, T)> {
                vec![$((stringify!($field).to_string(), self.$field)),*]
            }

            fn of_port_list(ports: Vec<(String, T)>) -> $crate::Result<Self> {
                let mut ports = $crate::PortList::new(
                    <Self as $crate::Interface<T>>::FIELDS,
                    ports,
                )?;
                Ok($name {
                    $($field: ports.take(stringify!($field))?,)*
                })
            }
        }
    };
}
