//! Core records to wire bodies.

use api_shared::wire::{
    AppointmentRes, CompleteAppointmentRes, ConsultationRes, DepartmentRes, DoctorRes,
    HistoryRes, PatientRes, PrescriptionRes, ProfileRes, UserRes,
};
use chrono::{DateTime, SecondsFormat, Utc};
use clinic_core::{
    Appointment, AppointmentDetail, CompletedAppointment, Consultation, Department, Doctor,
    Patient, PatientHistory, Prescription, PrescriptionDetail, Principal,
};

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn profile(p: &Principal) -> ProfileRes {
    ProfileRes {
        id: p.id,
        email: p.email.to_string(),
        name: p.name.clone(),
        picture: p.picture.clone(),
        role: p.role.to_string(),
    }
}

pub fn user(p: &Principal) -> UserRes {
    UserRes {
        id: p.id,
        email: p.email.to_string(),
        subject: p.subject.clone(),
        name: p.name.clone(),
        picture: p.picture.clone(),
        role: p.role.to_string(),
        created_at: rfc3339(p.created_at),
        updated_at: rfc3339(p.updated_at),
    }
}

pub fn department(d: Department) -> DepartmentRes {
    DepartmentRes {
        id: d.id,
        name: d.name,
        description: d.description,
    }
}

pub fn doctor(d: Doctor) -> DoctorRes {
    DoctorRes {
        id: d.profile.id,
        name: d.name,
        email: d.email,
        picture: d.picture,
        specialization: d.profile.specialization,
        department: d.department.map(department),
    }
}

pub fn patient(p: Patient) -> PatientRes {
    PatientRes {
        id: p.profile.id,
        name: p.name,
        email: p.email,
        picture: p.picture,
        date_of_birth: p
            .profile
            .date_of_birth
            .map(|d| d.format("%Y-%m-%d").to_string()),
        gender: p.profile.gender,
    }
}

pub fn appointment(a: &Appointment) -> AppointmentRes {
    AppointmentRes {
        id: a.id,
        patient_id: a.patient_id,
        doctor_id: a.doctor_id,
        appointment_date: rfc3339(a.appointment_date),
        status: a.status.to_string(),
        patient_name: None,
        doctor_name: None,
        specialization: None,
        department: None,
    }
}

pub fn appointment_detail(d: AppointmentDetail) -> AppointmentRes {
    AppointmentRes {
        patient_name: Some(d.patient_name),
        doctor_name: Some(d.doctor_name),
        specialization: Some(d.specialization),
        department: d.department,
        ..appointment(&d.appointment)
    }
}

pub fn prescription(p: &Prescription) -> PrescriptionRes {
    PrescriptionRes {
        id: p.id,
        consultation_id: p.consultation_id,
        medication: p.medication.clone(),
        dosage: p.dosage.clone(),
        status: p.status.to_string(),
        created_at: rfc3339(p.created_at),
        appointment_id: None,
        diagnosis: None,
        doctor_name: None,
    }
}

pub fn prescription_detail(d: PrescriptionDetail) -> PrescriptionRes {
    PrescriptionRes {
        appointment_id: Some(d.appointment_id),
        diagnosis: Some(d.diagnosis),
        doctor_name: Some(d.doctor_name),
        ..prescription(&d.prescription)
    }
}

pub fn completed(c: CompletedAppointment) -> CompleteAppointmentRes {
    CompleteAppointmentRes {
        appointment: appointment(&c.appointment),
        consultation_id: c.consultation.id,
        diagnosis: c.consultation.diagnosis,
        notes: c.consultation.notes,
        prescriptions: c.prescriptions.iter().map(prescription).collect(),
    }
}

pub fn history(h: PatientHistory) -> HistoryRes {
    HistoryRes {
        appointments: h.appointments.into_iter().map(appointment_detail).collect(),
        prescriptions: h.prescriptions.into_iter().map(prescription_detail).collect(),
    }
}

pub fn consultation(c: Consultation, prescriptions: &[Prescription]) -> ConsultationRes {
    ConsultationRes {
        id: c.id,
        appointment_id: c.appointment_id,
        diagnosis: c.diagnosis,
        notes: c.notes,
        date: rfc3339(c.date),
        prescriptions: prescriptions.iter().map(prescription).collect(),
    }
}
