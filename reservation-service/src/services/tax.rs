//! Tourist-tax calculation.

use rust_decimal::Decimal;

/// Tax owed for a stay: `min(nights, cap) * rate * non_exempt_guests`.
///
/// Exempt guests are excluded from the multiplier entirely, not charged a
/// reduced rate. Pure function; the paid flag and payment proof live on the
/// booking and are mutated explicitly, never inferred from this.
pub fn tourist_tax(
    nights: i64,
    rate_per_night: Decimal,
    max_nights: i64,
    non_exempt_guests: u32,
) -> Decimal {
    let taxable_nights = nights.clamp(0, max_nights.max(0));
    rate_per_night * Decimal::from(taxable_nights) * Decimal::from(non_exempt_guests)
}
