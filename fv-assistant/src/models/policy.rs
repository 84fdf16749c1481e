//! Fixed persona and sampling parameters applied to every model session.

use serde::Serialize;

/// System instruction for the photovoltaic technical assistant.
pub const SYSTEM_INSTRUCTION: &str = "\
Tu rol es ser un Asistente Técnico Especializado en Instalaciones Fotovoltaicas.
Debes responder con precisión, basándote en conocimientos técnicos de:
- Componentes (paneles, inversores, estructuras).
- Diseño de sistemas.
- Cálculos de rendimiento y dimensionamiento.
- Normativas (ej. CTE, REBT, R.D. 244/2019 en España, o equivalentes).
Tu tono debe ser profesional, claro, didáctico y útil.
Siempre que sea posible, ofrece la respuesta sencilla, pero con la explicación técnica detrás.
Si te preguntan algo fuera de la energía solar fotovoltaica, responde que tu especialidad es únicamente FV.";

/// Low temperature keeps answers precise rather than creative.
pub const TEMPERATURE: f32 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingParams {
    /// In `[0, 1]`.
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

/// Immutable instruction + sampling bundle. There is no runtime setter; the
/// only constructor is the built-in persona.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemPolicy {
    system_instruction: &'static str,
    sampling: SamplingParams,
}

impl SystemPolicy {
    pub fn photovoltaic() -> Self {
        Self {
            system_instruction: SYSTEM_INSTRUCTION,
            sampling: SamplingParams {
                temperature: TEMPERATURE,
                top_p: None,
                top_k: None,
            },
        }
    }

    pub fn system_instruction(&self) -> &str {
        self.system_instruction
    }

    pub fn sampling(&self) -> &SamplingParams {
        &self.sampling
    }
}
