use super::SourceTreatment;

/// Fills the volumetric exchange source terms for the fluid energy equation.
///
/// `hvol` and `solid_temp` are the values kept from the last exchange, `tf` is
/// the current fluid temperature. With [`SourceTreatment::Explicit`] the whole
/// term `-hvol × (tf − solid_temp)` goes to `explicit`. With
/// [`SourceTreatment::Implicit`], `explicit` gets `hvol × solid_temp` and
/// `implicit` gets `hvol`.
///
/// Every slice must have the same length.
pub fn source_contributions(
    treatment: SourceTreatment,
    hvol: &[f64],
    solid_temp: &[f64],
    tf: &[f64],
    implicit: &mut [f64],
    explicit: &mut [f64],
) {
    let n = hvol.len();
    debug_assert!([solid_temp.len(), tf.len(), implicit.len(), explicit.len()]
        .iter()
        .all(|&len| len == n));

    let terms = implicit
        .iter_mut()
        .zip(explicit.iter_mut())
        .zip(hvol.iter().zip(solid_temp).zip(tf));

    for ((imp, exp), ((&h, &ts), &t)) in terms {
        match treatment {
            SourceTreatment::Explicit => {
                *exp = -h * (t - ts);
                *imp = 0.0;
            }
            SourceTreatment::Implicit => {
                *exp = h * ts;
                *imp = h;
            }
        }
    }
}
