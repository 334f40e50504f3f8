use proptest::prelude::*;

use super::*;

fn prop_datatype() -> impl Strategy<Value = Datatype> {
    proptest::strategy::Union::new(DATATYPES.iter().map(|dt| Just(*dt)))
}

/// Element types for which a zero-filled value is a meaningful number,
/// i.e. excluding booleans and timestamps.
fn prop_datatype_numeric() -> impl Strategy<Value = Datatype> {
    prop_datatype()
        .prop_filter("numeric element type", |dt| {
            dt.is_integral_type() || dt.is_real_type()
        })
}

#[derive(Clone, Copy, Debug, Default)]
pub enum DatatypeContext {
    #[default]
    NotApplicable,
    Numeric,
}

impl Arbitrary for Datatype {
    type Parameters = DatatypeContext;
    type Strategy = BoxedStrategy<Datatype>;

    fn arbitrary_with(p: Self::Parameters) -> Self::Strategy {
        match p {
            DatatypeContext::NotApplicable => prop_datatype().boxed(),
            DatatypeContext::Numeric => prop_datatype_numeric().boxed(),
        }
    }
}
