// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in seed knowledge base for RAG-grounded SmartNotes.
//!
//! Foundational French clinical passages: emergency protocols, antibiotic
//! and analgesic schemes, surgical precautions. Ingested once, on the first
//! startup where the knowledge collection is empty. Practices can extend the
//! knowledge base through their own documents; the seed set only provides
//! immediate retrieval value out of the box.

use dentassist_core::KnowledgeDoc;

/// Returns the built-in seed knowledge set.
pub fn seed_knowledge() -> Vec<KnowledgeDoc> {
    let passages: [(&str, &str, &str); 10] = [
        (
            "Protocole clinique",
            "Urgences - Pulpite",
            "Pulpite aiguë irréversible : douleur spontanée, pulsatile, exacerbée par le chaud. \
             Traitement d'urgence par pulpotomie ou pulpectomie sous anesthésie locale. \
             Antalgie : ibuprofène 400 mg toutes les 6 h en l'absence de contre-indication, \
             sinon paracétamol 1 g toutes les 6 h. Pas d'antibiothérapie sans signe infectieux. \
             Revoir le patient sous 48 à 72 h pour le traitement endodontique définitif.",
        ),
        (
            "Protocole clinique",
            "Urgences - Avulsion traumatique",
            "Avulsion d'une dent permanente : réimplanter dans les 60 minutes si possible. \
             Conserver la dent dans du lait, du sérum physiologique ou de la salive, ne jamais \
             toucher la racine. Contention souple 2 semaines, 4 semaines en cas de fracture \
             alvéolaire. Amoxicilline 2 g/j pendant 7 jours. Vérifier la vaccination \
             antitétanique. Contrôles à J7, J30, 3 mois, 6 mois puis annuels.",
        ),
        (
            "Protocole clinique",
            "Urgences - Abcès périapical",
            "Abcès périapical aigu : douleur intense, tuméfaction, douleur à la percussion, \
             fièvre possible. Drainage par voie endodontique ou incision. Amoxicilline 2 g/j \
             pendant 7 jours, clindamycine 1200 mg/j en cas d'allergie aux pénicillines. \
             Paracétamol 1 g x4/j, ibuprofène 400 mg x3/j en complément si besoin. \
             Réévaluation sous 48 h, traitement conservateur ou extraction selon le pronostic.",
        ),
        (
            "Référentiel prescription",
            "Antibiothérapie prophylactique",
            "Antibioprophylaxie réservée aux patients à haut risque d'endocardite infectieuse : \
             prothèse valvulaire, antécédent d'endocardite, cardiopathie congénitale cyanogène. \
             Amoxicilline 2 g per os dans l'heure précédant le geste ; clindamycine 600 mg en \
             cas d'allergie. Les actes concernés sont ceux impliquant une manipulation de la \
             gencive ou de la région périapicale.",
        ),
        (
            "Référentiel prescription",
            "Patients sous anticoagulants",
            "Patient sous AVK : ne pas interrompre le traitement pour une avulsion simple si \
             l'INR est inférieur à 4, mesuré dans les 24 h précédant le geste. Hémostase locale \
             soigneuse : compression, suture, acide tranexamique en bain de bouche. \
             Patient sous AOD : avulsion simple à distance du pic plasmatique, pas de relais \
             héparinique sans avis cardiologique.",
        ),
        (
            "Référentiel prescription",
            "Bisphosphonates et ostéonécrose",
            "Patient sous bisphosphonates : risque d'ostéonécrose des mâchoires, surtout en \
             administration intraveineuse. Privilégier les traitements conservateurs, éviter \
             les avulsions non indispensables. Si l'extraction est inévitable : antibiothérapie \
             encadrante, régularisation osseuse minimale, fermeture muqueuse, suivi jusqu'à \
             cicatrisation complète.",
        ),
        (
            "Protocole clinique",
            "Alvéolite sèche",
            "Alvéolite sèche : douleur intense 2 à 4 jours après extraction, alvéole vide sans \
             suppuration, halitose. Irrigation douce au sérum physiologique, pansement alvéolaire \
             à renouveler toutes les 48 h. Antalgiques de palier 1 ou 2 ; l'antibiothérapie n'est \
             pas indiquée en l'absence de signes infectieux généraux.",
        ),
        (
            "Protocole clinique",
            "Cellulite cervico-faciale",
            "Cellulite d'origine dentaire : tuméfaction diffuse, trismus, dysphagie, fièvre. \
             Urgence thérapeutique : drainage chirurgical de la collection et traitement de la \
             dent causale. Amoxicilline-acide clavulanique 3 g/j ; hospitalisation si extension \
             cervicale, trismus serré ou terrain immunodéprimé. Les AINS sont à proscrire.",
        ),
        (
            "Référentiel pédodontie",
            "Traumatismes en denture temporaire",
            "Traumatisme d'une dent temporaire : ne jamais réimplanter une dent temporaire \
             avulsée, risque pour le germe de la dent permanente. Intrusion : surveillance, \
             la dent fait le plus souvent sa ré-éruption en 2 à 4 mois. Contrôle radiographique \
             du germe sous-jacent à 6 mois puis à l'éruption de la dent définitive.",
        ),
        (
            "Référentiel implantologie",
            "Suites opératoires implantaires",
            "Pose d'implant : antalgie par paracétamol en première intention, glace les premières \
             heures, reprise du brossage doux à 24 h en évitant le site. Bains de bouche à la \
             chlorhexidine 0,12 % pendant 7 jours, à débuter le lendemain de la chirurgie. \
             Contrôle à 10 jours pour dépose des sutures, ostéo-intégration évaluée à 8 semaines \
             au maxillaire inférieur et 12 semaines au maxillaire supérieur.",
        ),
    ];

    passages
        .iter()
        .enumerate()
        .map(|(i, (source, section, body))| KnowledgeDoc {
            id: format!("kb-{:03}", i + 1),
            source: (*source).to_string(),
            section: (*section).to_string(),
            body: (*body).to_string(),
        })
        .collect()
}
