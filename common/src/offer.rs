use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub semestre: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    #[serde(default)]
    pub id: String,
    pub sigla: String,
    pub nombre: String,
    pub creditos: u32,
    #[serde(default)]
    pub es_electiva: bool,
    pub nivel: Level,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub dia_semana: String,
    pub hora_inicio: String,
    pub hora_fin: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub numero: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomAssignment {
    pub aula: Room,
    #[serde(default)]
    pub horario: Vec<TimeSlot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teacher {
    pub nombre: String,
    #[serde(default)]
    pub apellido_paterno: String,
    #[serde(default)]
    pub apellido_materno: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDetail {
    pub id: String,
    pub grupo: String,
    pub inscritos: u32,
    pub cupos: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, rename = "AulaGrupoMateria")]
    pub rooms: Vec<RoomAssignment>,
    #[serde(rename = "Docente")]
    pub docente: Option<Teacher>,
    pub materia: Subject,
}

fn default_true() -> bool { true }

/// One selectable section offering (`oferta-grupo-materia`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseOffer {
    pub id: String,
    #[serde(default)]
    pub grupo_materia_id: String,
    pub detalle_grupo_materia: GroupDetail,
}

impl CourseOffer {
    pub fn credits(&self) -> u32 {
        self.detalle_grupo_materia.materia.creditos
    }

    pub fn seats_left(&self) -> u32 {
        let detail = &self.detalle_grupo_materia;
        detail.cupos.saturating_sub(detail.inscritos)
    }

    pub fn teacher_name(&self) -> String {
        match &self.detalle_grupo_materia.docente {
            Some(t) => format!("{} {}", t.nombre, t.apellido_paterno).trim().to_string(),
            None => String::new(),
        }
    }

    /// "Lun 08:00-09:30 (A12)" style schedule lines, one per slot.
    pub fn schedule_lines(&self) -> Vec<String> {
        self.detalle_grupo_materia
            .rooms
            .iter()
            .flat_map(|room| {
                room.horario.iter().map(move |slot| {
                    format!(
                        "{} {}-{} ({})",
                        slot.dia_semana, slot.hora_inicio, slot.hora_fin, room.aula.numero
                    )
                })
            })
            .collect()
    }
}

pub fn total_credits(offers: &[CourseOffer]) -> u32 {
    offers.iter().map(CourseOffer::credits).sum()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlipSubject {
    pub nombre: String,
    pub creditos: u32,
    pub sigla: String,
    pub nivel: Level,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlipGroup {
    pub grupo: String,
    pub materia: SlipSubject,
}

/// Enrollment slip line (`boleta-inscripcion`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrolledCourse {
    pub id: String,
    #[serde(default)]
    pub nota: Option<f64>,
    pub grupo_materia: SlipGroup,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_parses_nested_payload() {
        let raw = r#"{
            "id": "of-1",
            "grupoMateriaId": "gm-1",
            "detalleGrupoMateria": {
                "id": "gm-1", "grupo": "SA", "inscritos": 38, "cupos": 40,
                "AulaGrupoMateria": [{"aula": {"numero": 12},
                    "horario": [{"diaSemana": "Lun", "horaInicio": "08:00", "horaFin": "09:30"}]}],
                "Docente": {"nombre": "Luis", "apellido_paterno": "Rojas"},
                "materia": {"sigla": "INF110", "nombre": "Introduccion", "creditos": 5,
                            "nivel": {"semestre": 1}}
            }
        }"#;
        let offer: CourseOffer = serde_json::from_str(raw).unwrap();
        assert_eq!(offer.seats_left(), 2);
        assert_eq!(offer.teacher_name(), "Luis Rojas");
        assert_eq!(offer.schedule_lines(), vec!["Lun 08:00-09:30 (12)".to_string()]);
        assert_eq!(total_credits(&[offer.clone(), offer]), 10);
    }
}
