// ==============================================================================
// tire.rs — MAGIC FORMULA TIRE FORCES (PURE + COMBINED SLIP)
// ==============================================================================
// Pure functions, no state. Turn slip is neglected and every scaling factor is 1.
//
// Pure slip:
//   F = D * sin(C * atan(B*x - E*(B*x - atan(B*x))) ...) with shifts Sh / Sv
//   - longitudinal: Sv sits INSIDE the sine (reference outputs depend on it)
//   - lateral:      Sv is added after the sine and Sh/Sv follow camber sign
//
// Combined slip:
//   The pure force is rescaled by a cosine weighting driven by the OTHER slip
//   channel (alpha for Fx, kappa for Fy). This is the friction-circle coupling
//   between braking/driving and cornering.
//
// Degenerate denominators (C*D == 0 for B, cos(...) == 0 for D_alpha/D_kappa)
// resolve to exactly 0.0 instead of NaN/inf.
// ==============================================================================

use serde::{Deserialize, Serialize};

/// Magic Formula coefficients. Field names match the parameter files.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TireParameters {
    // --- longitudinal, pure slip ---
    pub p_cx1: f64, // shape factor
    pub p_dx1: f64, // peak friction
    pub p_dx3: f64, // camber influence on peak friction
    pub p_ex1: f64, // curvature factor
    pub p_kx1: f64, // slip stiffness / Fz
    pub p_hx1: f64, // horizontal shift
    pub p_vx1: f64, // vertical shift / Fz

    // --- longitudinal, combined slip ---
    pub r_bx1: f64,
    pub r_bx2: f64,
    pub r_cx1: f64,
    pub r_ex1: f64,
    pub r_hx1: f64,

    // --- lateral, pure slip ---
    pub p_cy1: f64,
    pub p_dy1: f64,
    pub p_dy3: f64,
    pub p_ey1: f64,
    pub p_ky1: f64,
    pub p_hy1: f64,
    pub p_hy3: f64,
    pub p_vy1: f64,
    pub p_vy3: f64,

    // --- lateral, combined slip ---
    pub r_by1: f64,
    pub r_by2: f64,
    pub r_by3: f64,
    pub r_cy1: f64,
    pub r_ey1: f64,
    pub r_hy1: f64,
    pub r_vy1: f64,
    pub r_vy3: f64,
    pub r_vy4: f64,
    pub r_vy5: f64,
    pub r_vy6: f64,
}

/// Passenger-car tire used by the reference vehicles.
pub const REFERENCE_TIRE: TireParameters = TireParameters {
    p_cx1: 1.6411,
    p_dx1: 1.1739,
    p_dx3: 0.0,
    p_ex1: 0.46403,
    p_kx1: 22.303,
    p_hx1: 0.0012297,
    p_vx1: -8.8098e-6,

    r_bx1: 13.276,
    r_bx2: -13.778,
    r_cx1: 1.2568,
    r_ex1: 0.65225,
    r_hx1: 0.0050722,

    p_cy1: 1.3507,
    p_dy1: 1.0489,
    p_dy3: -2.8821,
    p_ey1: -0.0074722,
    p_ky1: -21.92,
    p_hy1: 0.0026747,
    p_hy3: 0.031415,
    p_vy1: 0.037318,
    p_vy3: -0.32931,

    r_by1: 7.1433,
    r_by2: 9.1916,
    r_by3: -0.027856,
    r_cy1: 1.0719,
    r_ey1: -0.27572,
    r_hy1: 5.7448e-6,
    r_vy1: -0.027825,
    r_vy3: -0.27568,
    r_vy4: 12.12,
    r_vy5: 1.9,
    r_vy6: -10.704,
};

/// Combined-slip tire forces for one wheel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TireForces {
    pub fx: f64, // N
    pub fy: f64, // N
}

// sign with sign(0) == 0 (f64::signum maps +0.0 to 1.0)
#[inline]
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[inline]
fn safe_div(num: f64, den: f64) -> f64 {
    if den == 0.0 { 0.0 } else { num / den }
}

// C * atan(B*x - E*(B*x - atan(B*x)))
#[inline]
fn magic_core(b: f64, c: f64, e: f64, x: f64) -> f64 {
    let bx = b * x;
    c * (bx - e * (bx - bx.atan())).atan()
}

/// Pure longitudinal force from slip ratio `kappa` [-], camber `gamma` [rad]
/// and normal load `f_z` [N].
pub fn pure_longitudinal(kappa: f64, gamma: f64, f_z: f64, p: &TireParameters) -> f64 {
    // coordinate system transformation
    let kappa = -kappa;

    let s_hx = p.p_hx1;
    let s_vx = f_z * p.p_vx1;

    let kappa_x = kappa + s_hx;
    let mu_x = p.p_dx1 * (1.0 - p.p_dx3 * gamma * gamma);

    let c_x = p.p_cx1;
    let d_x = mu_x * f_z;
    let e_x = p.p_ex1;
    let k_x = f_z * p.p_kx1;
    let b_x = safe_div(k_x, c_x * d_x);

    d_x * (magic_core(b_x, c_x, e_x, kappa_x) + s_vx).sin()
}

/// Pure lateral force from slip angle `alpha` [rad]. Returns `(F_y, mu_y)`;
/// the peak friction is needed by [`combined_lateral`].
pub fn pure_lateral(alpha: f64, gamma: f64, f_z: f64, p: &TireParameters) -> (f64, f64) {
    let s_hy = sign(gamma) * (p.p_hy1 + p.p_hy3 * gamma.abs());
    let s_vy = sign(gamma) * f_z * (p.p_vy1 + p.p_vy3 * gamma.abs());

    let alpha_y = alpha + s_hy;
    let mu_y = p.p_dy1 * (1.0 - p.p_dy3 * gamma * gamma);

    let c_y = p.p_cy1;
    let d_y = mu_y * f_z;
    let e_y = p.p_ey1;
    let k_y = f_z * p.p_ky1;
    let b_y = safe_div(k_y, c_y * d_y);

    let f_y = d_y * magic_core(b_y, c_y, e_y, alpha_y).sin() + s_vy;
    (f_y, mu_y)
}

/// Longitudinal force under combined slip, weighted by slip angle `alpha`.
pub fn combined_longitudinal(kappa: f64, alpha: f64, f0_x: f64, p: &TireParameters) -> f64 {
    let s_hxalpha = p.r_hx1;
    let alpha_s = alpha + s_hxalpha;

    let b_xalpha = p.r_bx1 * (p.r_bx2 * kappa).atan().cos();
    let c_xalpha = p.r_cx1;
    let e_xalpha = p.r_ex1;

    let den = magic_core(b_xalpha, c_xalpha, e_xalpha, s_hxalpha).cos();
    let d_xalpha = safe_div(f0_x, den);

    d_xalpha * magic_core(b_xalpha, c_xalpha, e_xalpha, alpha_s).cos()
}

/// Lateral force under combined slip, weighted by slip ratio `kappa`.
pub fn combined_lateral(
    kappa: f64,
    alpha: f64,
    gamma: f64,
    mu_y: f64,
    f_z: f64,
    f0_y: f64,
    p: &TireParameters,
) -> f64 {
    let s_hykappa = p.r_hy1;
    let kappa_s = kappa + s_hykappa;

    let b_ykappa = p.r_by1 * (p.r_by2 * (alpha - p.r_by3)).atan().cos();
    let c_ykappa = p.r_cy1;
    let e_ykappa = p.r_ey1;

    let den = magic_core(b_ykappa, c_ykappa, e_ykappa, s_hykappa).cos();
    let d_ykappa = safe_div(f0_y, den);

    let d_vykappa =
        mu_y * f_z * (p.r_vy1 + p.r_vy3 * gamma) * (p.r_vy4 * alpha).atan().cos();
    let s_vykappa = d_vykappa * (p.r_vy5 * (p.r_vy6 * kappa).atan()).sin();

    d_ykappa * magic_core(b_ykappa, c_ykappa, e_ykappa, kappa_s).cos() + s_vykappa
}

/// Pure + combined evaluation for one contact.
pub fn tire_forces(kappa: f64, alpha: f64, gamma: f64, f_z: f64, p: &TireParameters) -> TireForces {
    let f0_x = pure_longitudinal(kappa, gamma, f_z, p);
    let (f0_y, mu_y) = pure_lateral(alpha, gamma, f_z, p);

    TireForces {
        fx: combined_longitudinal(kappa, alpha, f0_x, p),
        fy: combined_lateral(kappa, alpha, gamma, mu_y, f_z, f0_y, p),
    }
}
